use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub struct HeartbeatDue {
    pub done: oneshot::Sender<()>,
}

/// Emits a `HeartbeatDue` one `period` after the previous heartbeat's write completed.
///
/// Nothing is emitted once `cancel` fires, even if a period has already elapsed.
pub fn spawn_heartbeat(
    period: Duration,
    due: mpsc::Sender<HeartbeatDue>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(period) => {}
            }

            let (done, completed) = oneshot::channel();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                sent = due.send(HeartbeatDue { done }) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                // A dropped sender counts as completion.
                _ = completed => {}
            }
        }
        tracing::debug!("heartbeat stopped");
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    use super::spawn_heartbeat;

    #[tokio::test(start_paused = true)]
    async fn waits_for_previous_write_before_rearming() {
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let started = Instant::now();
        let task = spawn_heartbeat(Duration::from_secs(60), tx, cancel.clone());

        let first = rx.recv().await.expect("first heartbeat");
        assert!(started.elapsed() >= Duration::from_secs(60));
        assert!(started.elapsed() < Duration::from_secs(61));

        // The write takes 30s; the next period only starts afterwards.
        tokio::time::sleep(Duration::from_secs(30)).await;
        first.done.send(()).expect("heartbeat task should wait for ack");

        let second = rx.recv().await.expect("second heartbeat");
        assert!(started.elapsed() >= Duration::from_secs(150));
        assert!(started.elapsed() < Duration::from_secs(151));
        drop(second);

        cancel.cancel();
        task.await.expect("heartbeat task should stop");
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_pending_cycle() {
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let task = spawn_heartbeat(Duration::from_secs(60), tx, cancel.clone());

        tokio::time::sleep(Duration::from_secs(30)).await;
        cancel.cancel();
        task.await.expect("heartbeat task should stop");

        assert!(rx.recv().await.is_none());
    }
}
