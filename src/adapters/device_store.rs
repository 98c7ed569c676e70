use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::device_record::{DeviceRecord, RecordPatch};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("store responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode device document: {0}")]
    Decode(String),
    #[error("invalid store configuration: {0}")]
    Config(String),
    #[error("device document {0} does not exist")]
    Missing(String),
}

/// Stream of full records pushed by a document subscription.
pub type RecordFeed = mpsc::Receiver<Result<DeviceRecord, StoreError>>;

/// The remote collection holding device records.
///
/// Every record returned carries the document key as its `id`, whatever the body says.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<DeviceRecord>, StoreError>;

    /// Documents whose `uid` field equals `uid`.
    async fn find_by_uid(&self, uid: &str) -> Result<Vec<DeviceRecord>, StoreError>;

    /// Writes only the fields present in `patch`.
    async fn merge(&self, id: &str, patch: &RecordPatch) -> Result<(), StoreError>;

    /// Pushes the document on every change, including changes made through `merge`, until
    /// `cancel` fires.
    fn subscribe(&self, id: &str, cancel: CancellationToken) -> RecordFeed;
}
