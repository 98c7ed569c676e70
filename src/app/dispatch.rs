use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::adapters::device_store::DeviceStore;
use crate::adapters::record_cache::RecordCache;
use crate::domain::device_record::{DeviceRecord, RecordPatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteTarget {
    Remote,
    Cache,
}

impl fmt::Display for WriteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote => f.write_str("remote"),
            Self::Cache => f.write_str("cache"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFailure {
    pub write_id: Uuid,
    pub target: WriteTarget,
    pub reason: String,
}

// Writes may complete in any order. Failures are reported on the `failures` channel with the id
// returned at dispatch time.
pub struct WriteDispatcher {
    store: Arc<dyn DeviceStore>,
    cache: Arc<dyn RecordCache>,
    failures: mpsc::UnboundedSender<WriteFailure>,
    in_flight: JoinSet<()>,
}

impl WriteDispatcher {
    pub fn new(
        store: Arc<dyn DeviceStore>,
        cache: Arc<dyn RecordCache>,
        failures: mpsc::UnboundedSender<WriteFailure>,
    ) -> Self {
        Self {
            store,
            cache,
            failures,
            in_flight: JoinSet::new(),
        }
    }

    pub fn remote(&mut self, id: &str, patch: RecordPatch, done: Option<oneshot::Sender<()>>) -> Uuid {
        let write_id = Uuid::new_v4();
        let store = Arc::clone(&self.store);
        let failures = self.failures.clone();
        let id = id.to_string();

        self.in_flight.spawn(async move {
            let fields = patch.field_paths();
            match store.merge(&id, &patch).await {
                Ok(()) => {
                    tracing::debug!(%write_id, document = %id, ?fields, "remote write applied");
                }
                Err(error) => report(
                    &failures,
                    WriteFailure {
                        write_id,
                        target: WriteTarget::Remote,
                        reason: error.to_string(),
                    },
                ),
            }
            if let Some(done) = done {
                let _ = done.send(());
            }
        });

        write_id
    }

    pub fn cache(&mut self, record: DeviceRecord) -> Uuid {
        let write_id = Uuid::new_v4();
        let cache = Arc::clone(&self.cache);
        let failures = self.failures.clone();

        self.in_flight.spawn(async move {
            let outcome = tokio::task::spawn_blocking(move || cache.save(&record)).await;
            let reason = match outcome {
                Ok(Ok(())) => {
                    tracing::debug!(%write_id, "cache snapshot written");
                    return;
                }
                Ok(Err(error)) => error.to_string(),
                Err(error) => format!("cache writer task failed: {error}"),
            };
            report(
                &failures,
                WriteFailure {
                    write_id,
                    target: WriteTarget::Cache,
                    reason,
                },
            );
        });

        write_id
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn reap(&mut self) {
        while let Some(result) = self.in_flight.try_join_next() {
            if let Err(error) = result {
                tracing::error!(error = %error, "write task panicked");
            }
        }
    }

    /// Waits for every in-flight write, abandoning the rest after `timeout`. Returns whether all
    /// of them finished.
    pub async fn drain(&mut self, timeout: Duration) -> bool {
        let in_flight = &mut self.in_flight;
        let finished = tokio::time::timeout(timeout, async {
            while let Some(result) = in_flight.join_next().await {
                if let Err(error) = result {
                    tracing::error!(error = %error, "write task panicked");
                }
            }
        })
        .await
        .is_ok();

        if !finished {
            tracing::warn!(pending = self.in_flight.len(), "abandoning unfinished writes");
            self.in_flight.abort_all();
        }
        finished
    }
}

fn report(failures: &mpsc::UnboundedSender<WriteFailure>, failure: WriteFailure) {
    if let Err(unsent) = failures.send(failure) {
        let failure = unsent.0;
        tracing::warn!(
            write_id = %failure.write_id,
            target = %failure.target,
            reason = %failure.reason,
            "write failed with nobody listening"
        );
    }
}
