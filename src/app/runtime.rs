use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::adapters::cable_detector::{CableEdges, spawn_cable_detector};
use crate::adapters::device_store::{DeviceStore, RecordFeed};
use crate::adapters::firestore::FirestoreStore;
use crate::adapters::gpio::{InputLine, SysfsGpio};
use crate::adapters::machine_id::read_machine_uid;
use crate::adapters::record_cache::{CacheError, JsonFileCache, RecordCache};
use crate::adapters::relay_bank::{HardwareIo, RelayBank};
use crate::app::bootstrap::{BootstrapError, resolve_device};
use crate::app::config::AppConfig;
use crate::app::dispatch::WriteFailure;
use crate::app::error::AppError;
use crate::app::heartbeat::{HeartbeatDue, spawn_heartbeat};
use crate::app::reconciler::{Collaborators, Reconciler, RemoteOutcome};
use crate::domain::cable_debounce::CableDebouncer;
use crate::domain::clock::{Clock, TimestampMs};
use crate::domain::device_record::DeviceRecord;
use crate::domain::session_policy::SessionPolicy;

#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> TimestampMs {
        TimestampMs(Utc::now().timestamp_millis())
    }
}

pub(crate) struct EventSources {
    pub edges: CableEdges,
    pub remote: RecordFeed,
    pub heartbeats: mpsc::Receiver<HeartbeatDue>,
    pub failures: mpsc::UnboundedReceiver<WriteFailure>,
}

pub(crate) struct HeartbeatHandle {
    pub cancel: CancellationToken,
    pub task: JoinHandle<()>,
}

#[derive(Debug)]
enum LoopExit {
    Interrupted,
    DetectorFault(String),
    SubscriptionClosed,
}

struct Startup {
    record: DeviceRecord,
    store: Arc<FirestoreStore>,
    cache: Arc<JsonFileCache>,
}

pub fn run(config: AppConfig) -> Result<(), AppError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(AppError::runtime)?;

    runtime.block_on(serve(config))
}

async fn serve(config: AppConfig) -> Result<(), AppError> {
    let gpio = SysfsGpio::new(&config.gpio_root);
    let mut relays = RelayBank::open(&config.power_ports, config.relay_rest_level, |pin, level| {
        gpio.open_output(pin, level)
    })
    .map_err(AppError::hardware)?;

    let mut detector_line = match gpio.open_input(config.detector_port) {
        Ok(line) => line,
        Err(error) => {
            release_relays(&mut relays);
            return Err(AppError::hardware(error));
        }
    };
    tracing::info!(
        relays = ?relays.powers(),
        detector_port = config.detector_port,
        "hardware lines claimed"
    );

    let startup =
        release_on_failure(&mut relays, &mut detector_line, resolve_startup(&config)).await?;

    let cancel = CancellationToken::new();
    let (failures_tx, failures) = mpsc::unbounded_channel();
    let remote = startup
        .store
        .subscribe(&startup.record.id, cancel.child_token());

    let poll_interval = Duration::from_millis(config.detector_poll_interval_ms);
    let debouncer = CableDebouncer::new(
        CableDebouncer::samples_for(config.detector_debounce_ms, config.detector_poll_interval_ms),
        config.detector_edge,
    );
    let (edges, detector_task) =
        spawn_cable_detector(detector_line, debouncer, poll_interval, cancel.child_token());

    let (heartbeat_tx, heartbeats) = mpsc::channel(1);
    let heartbeat_cancel = cancel.child_token();
    let heartbeat_task = spawn_heartbeat(
        Duration::from_millis(config.heartbeat_interval_ms),
        heartbeat_tx,
        heartbeat_cancel.clone(),
    );

    tracing::info!(
        document = %startup.record.id,
        state = %startup.record.state,
        naming = ?config.state_naming,
        edges = ?config.detector_edge,
        "controller running"
    );

    let reconciler = Reconciler::new(
        startup.record,
        relays,
        SystemClock,
        SessionPolicy {
            naming: config.state_naming,
            staleness_threshold_ms: config.staleness_threshold_ms,
        },
        Collaborators {
            store: startup.store,
            cache: startup.cache,
            host: Arc::new(config.host_shutdown.clone()),
            failures: failures_tx,
        },
        Duration::from_millis(config.shutdown_write_timeout_ms),
    );

    let result = supervise(
        reconciler,
        EventSources {
            edges,
            remote,
            heartbeats,
            failures,
        },
        HeartbeatHandle {
            cancel: heartbeat_cancel,
            task: heartbeat_task,
        },
        shutdown_signal(),
    )
    .await;

    cancel.cancel();
    if detector_task.await.is_err() {
        tracing::warn!("cable detector task panicked");
    }

    result
}

// Claimed lines are handed back when startup fails after the hardware was opened.
async fn release_on_failure<H, I, T, F>(
    relays: &mut H,
    detector_line: &mut I,
    startup: F,
) -> Result<T, AppError>
where
    H: HardwareIo,
    I: InputLine,
    F: Future<Output = Result<T, AppError>>,
{
    let error = match startup.await {
        Ok(value) => return Ok(value),
        Err(error) => error,
    };

    tracing::error!(error = %error, "startup failed, releasing hardware lines");
    release_relays(relays);
    if let Err(release_error) = detector_line.release() {
        tracing::warn!(error = %release_error, "failed to release detector line");
    }
    Err(error)
}

fn load_cached_record(cache: &JsonFileCache) -> Result<DeviceRecord, AppError> {
    cache.load().map_err(|error| match error {
        CacheError::Missing(_) => AppError::InvalidCachePath(error.to_string()),
        other => AppError::UnreadableCache(other.to_string()),
    })
}

async fn resolve_startup(config: &AppConfig) -> Result<Startup, AppError> {
    let cache = JsonFileCache::new(&config.cache_path);
    let cached = load_cached_record(&cache)?;

    let uid = read_machine_uid(&config.machine_id_paths).map_err(AppError::identity)?;
    tracing::info!(uid = %uid, cached_id = %cached.id, "machine identity resolved");

    let store = FirestoreStore::new(
        &config.store,
        &config.device_collection,
        Duration::from_millis(config.store_poll_interval_ms),
    )
    .map_err(AppError::store)?;

    let record = resolve_device(&store, &uid, &cached.id)
        .await
        .map_err(|error| match error {
            BootstrapError::NotRegistered { uid, .. } => AppError::DeviceNotRegistered { uid },
            BootstrapError::Store(error) => AppError::store(error),
        })?;

    Ok(Startup {
        record,
        store: Arc::new(store),
        cache: Arc::new(cache),
    })
}

pub(crate) async fn supervise<H, Cl, S>(
    mut reconciler: Reconciler<H, Cl>,
    mut sources: EventSources,
    heartbeat: HeartbeatHandle,
    shutdown: S,
) -> Result<(), AppError>
where
    H: HardwareIo,
    Cl: Clock,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let exit = loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break LoopExit::Interrupted,
            edge = sources.edges.recv() => match edge {
                Some(Ok(connected)) => reconciler.on_cable_edge(connected),
                Some(Err(error)) => break LoopExit::DetectorFault(error.to_string()),
                None => break LoopExit::DetectorFault("cable detector stopped".to_string()),
            },
            pushed = sources.remote.recv() => match pushed {
                Some(Ok(record)) => match reconciler.on_remote_changed(record) {
                    RemoteOutcome::Activated(power) => tracing::debug!(power, "assignment activated"),
                    RemoteOutcome::Rejected(error) => tracing::debug!(error = %error, "assignment rejected"),
                    outcome => tracing::trace!(?outcome, "remote change handled"),
                },
                Some(Err(error)) => tracing::warn!(error = %error, "device subscription error"),
                None => break LoopExit::SubscriptionClosed,
            },
            Some(due) = sources.heartbeats.recv() => reconciler.on_heartbeat(due.done),
            Some(failure) = sources.failures.recv() => {
                tracing::warn!(
                    write_id = %failure.write_id,
                    target = %failure.target,
                    reason = %failure.reason,
                    "write did not land"
                );
            }
        }
        reconciler.reap_writes();
    };

    tracing::info!(
        document = %reconciler.record().id,
        reason = ?exit,
        pending_writes = reconciler.pending_writes(),
        "shutting down"
    );

    // No heartbeat may be dispatched once the shutdown write is under way.
    heartbeat.cancel.cancel();
    if heartbeat.task.await.is_err() {
        tracing::warn!("heartbeat task panicked");
    }

    if let LoopExit::DetectorFault(reason) = &exit {
        tracing::error!(reason = %reason, "cable detector failed, de-energizing relays");
        reconciler.fail_safe();
    }

    let report = reconciler.shutdown().await;
    tracing::info!(
        offline_written = report.offline_written,
        snapshot = ?report.snapshot_source,
        cache_saved = report.cache_saved,
        relays_released = report.relays_released,
        "controller stopped"
    );

    match exit {
        LoopExit::Interrupted => Ok(()),
        LoopExit::DetectorFault(reason) => Err(AppError::detector(reason)),
        LoopExit::SubscriptionClosed => Err(AppError::store("device subscription ended")),
    }
}

fn release_relays<H: HardwareIo>(relays: &mut H) {
    if let Err(error) = relays.release() {
        tracing::warn!(error = %error, "failed to release relay lines");
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => tracing::info!("received SIGINT"),
                    _ = sigterm.recv() => tracing::info!("received SIGTERM"),
                }
                return;
            }
            Err(error) => {
                tracing::warn!(error = %error, "SIGTERM handler unavailable, waiting for Ctrl-C only");
            }
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received interrupt"),
        Err(error) => {
            tracing::error!(error = %error, "interrupt handler unavailable");
            std::future::pending::<()>().await;
        }
    }
}
