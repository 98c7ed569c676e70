use thiserror::Error;

use crate::adapters::device_store::{DeviceStore, StoreError};
use crate::domain::device_record::{DeviceRecord, RecordPatch};

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("no device record at cached id {cached_id:?} and none claims machine uid {uid}")]
    NotRegistered { cached_id: String, uid: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

// The cached id is tried first; when it is absent or stale the record whose `uid` equals this
// machine's identity is adopted instead. A record without a `uid` is claimed for this machine.
pub async fn resolve_device(
    store: &dyn DeviceStore,
    uid: &str,
    cached_id: &str,
) -> Result<DeviceRecord, BootstrapError> {
    let cached = if cached_id.trim().is_empty() {
        None
    } else {
        store.get(cached_id).await?
    };

    let mut record = match cached {
        Some(record) => {
            tracing::info!(document = %record.id, "device record found at cached id");
            record
        }
        None => {
            tracing::info!(cached_id, "cached id unresolved, looking up device by machine uid");
            let matches = store.find_by_uid(uid).await?;
            if matches.len() > 1 {
                tracing::warn!(
                    count = matches.len(),
                    uid,
                    "several device records claim this machine, adopting the first"
                );
            }
            let record = matches.into_iter().next().ok_or_else(|| BootstrapError::NotRegistered {
                cached_id: cached_id.to_string(),
                uid: uid.to_string(),
            })?;
            tracing::info!(document = %record.id, "device record adopted by machine uid");
            record
        }
    };

    if !record.has_uid() {
        let claim = RecordPatch::claim_uid(uid);
        match store.merge(&record.id, &claim).await {
            Ok(()) => {
                claim.apply_to(&mut record);
                tracing::info!(document = %record.id, "device record claimed for this machine");
            }
            Err(error) => {
                tracing::warn!(document = %record.id, error = %error, "failed to claim device record");
            }
        }
    } else if record.uid.as_deref() != Some(uid) {
        tracing::warn!(
            document = %record.id,
            claimed_by = ?record.uid,
            "device record is claimed by another machine"
        );
    }

    Ok(record)
}
