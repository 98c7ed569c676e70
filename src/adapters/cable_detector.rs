use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::adapters::gpio::{GpioError, InputLine, LineLevel};
use crate::domain::cable_debounce::CableDebouncer;

// Debounced cable edges (`true` = connected); an `Err` is the detector's last message.
pub type CableEdges = mpsc::Receiver<Result<bool, GpioError>>;

// The task owns the input line and releases it when it stops, either on cancellation, on a
// read fault, or when the receiver is dropped.
pub fn spawn_cable_detector<I>(
    mut line: I,
    mut debouncer: CableDebouncer,
    poll_interval: Duration,
    cancel: CancellationToken,
) -> (CableEdges, JoinHandle<()>)
where
    I: InputLine + 'static,
{
    let (tx, rx) = mpsc::channel(16);

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut reported_baseline = false;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let connected = match line.read() {
                Ok(level) => level == LineLevel::High,
                Err(error) => {
                    tracing::error!(pin = line.pin(), error = %error, "cable detector read failed");
                    let _ = tx.send(Err(error)).await;
                    break;
                }
            };

            if let Some(connected) = debouncer.observe(connected) {
                tracing::info!(connected, "cable edge detected");
                if tx.send(Ok(connected)).await.is_err() {
                    break;
                }
            } else if !reported_baseline && let Some(stable) = debouncer.stable_connected() {
                reported_baseline = true;
                tracing::info!(connected = stable, "cable detector baseline established");
            }
        }

        if let Err(error) = line.release() {
            tracing::warn!(pin = line.pin(), error = %error, "failed to release detector line");
        }
    });

    (rx, handle)
}
