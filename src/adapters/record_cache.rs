use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

use crate::domain::device_record::DeviceRecord;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache file {0} does not exist")]
    Missing(PathBuf),
    #[error("failed to read cache file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cache file {path} is not a valid device record: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize device record: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to write cache file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub trait RecordCache: Send + Sync {
    fn load(&self) -> Result<DeviceRecord, CacheError>;
    fn save(&self, record: &DeviceRecord) -> Result<(), CacheError>;
}

#[derive(Debug, Clone)]
pub struct JsonFileCache {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl JsonFileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        PathBuf::from(staging)
    }
}

impl RecordCache for JsonFileCache {
    fn load(&self) -> Result<DeviceRecord, CacheError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Err(CacheError::Missing(self.path.clone()));
            }
            Err(source) => {
                return Err(CacheError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        serde_json::from_str(&raw).map_err(|source| CacheError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    // Written beside the target and renamed over it so a power cut never leaves half a file.
    fn save(&self, record: &DeviceRecord) -> Result<(), CacheError> {
        let body = serde_json::to_string_pretty(record).map_err(CacheError::Serialize)?;
        let staging = self.staging_path();
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        fs::write(&staging, body)
            .and_then(|_| fs::rename(&staging, &self.path))
            .map_err(|source| CacheError::Write {
                path: self.path.clone(),
                source,
            })
    }
}
