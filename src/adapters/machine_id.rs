use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

pub const DEFAULT_MACHINE_ID_PATHS: [&str; 2] = ["/var/lib/dbus/machine-id", "/etc/machine-id"];

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("no machine id found in {searched:?}")]
    NotFound { searched: Vec<PathBuf> },
    #[error("failed to read machine id from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub fn read_machine_uid<P: AsRef<Path>>(paths: &[P]) -> Result<String, IdentityError> {
    for path in paths {
        let path = path.as_ref();
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => continue,
            Err(source) => {
                return Err(IdentityError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        if let Some(uid) = hash_machine_id(&raw) {
            return Ok(uid);
        }
        tracing::warn!(path = %path.display(), "machine id file is empty, trying next source");
    }

    Err(IdentityError::NotFound {
        searched: paths.iter().map(|p| p.as_ref().to_path_buf()).collect(),
    })
}

pub fn hash_machine_id(raw: &str) -> Option<String> {
    let normalized: String = raw
        .lines()
        .next()?
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    if normalized.is_empty() {
        return None;
    }

    Some(hex::encode(Sha256::digest(normalized.as_bytes())))
}
