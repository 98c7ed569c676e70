use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::adapters::device_store::DeviceStore;
use crate::adapters::host_power::HostPower;
use crate::adapters::record_cache::RecordCache;
use crate::adapters::relay_bank::{HardwareIo, RelayError};
use crate::app::dispatch::{WriteDispatcher, WriteFailure};
use crate::domain::clock::Clock;
use crate::domain::device_record::{DeviceRecord, DeviceState};
use crate::domain::session_policy::{AssignmentError, SessionPolicy, validate_assignment};

pub struct Collaborators {
    pub store: Arc<dyn DeviceStore>,
    pub cache: Arc<dyn RecordCache>,
    pub host: Arc<dyn HostPower>,
    pub failures: mpsc::UnboundedSender<WriteFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    // Echo of our own write.
    Unchanged,
    Adopted,
    Activated(u32),
    Rejected(AssignmentError),
    RelayFault,
    HostShutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    Remote,
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub offline_written: bool,
    pub snapshot_source: SnapshotSource,
    pub cache_saved: bool,
    pub relays_released: bool,
}

// Handlers never wait on I/O except `shutdown`; one handler runs at a time.
pub struct Reconciler<H, Cl> {
    record: DeviceRecord,
    hardware: H,
    clock: Cl,
    policy: SessionPolicy,
    writes: WriteDispatcher,
    store: Arc<dyn DeviceStore>,
    cache: Arc<dyn RecordCache>,
    host: Arc<dyn HostPower>,
    shutdown_timeout: Duration,
    heartbeat_armed_offline: bool,
}

impl<H, Cl> Reconciler<H, Cl>
where
    H: HardwareIo,
    Cl: Clock,
{
    pub fn new(
        record: DeviceRecord,
        hardware: H,
        clock: Cl,
        policy: SessionPolicy,
        collaborators: Collaborators,
        shutdown_timeout: Duration,
    ) -> Self {
        let Collaborators {
            store,
            cache,
            host,
            failures,
        } = collaborators;
        let heartbeat_armed_offline = record.state == DeviceState::Offline;

        Self {
            record,
            hardware,
            clock,
            policy,
            writes: WriteDispatcher::new(Arc::clone(&store), Arc::clone(&cache), failures),
            store,
            cache,
            host,
            shutdown_timeout,
            heartbeat_armed_offline,
        }
    }

    pub fn record(&self) -> &DeviceRecord {
        &self.record
    }

    pub fn on_remote_changed(&mut self, incoming: DeviceRecord) -> RemoteOutcome {
        if incoming == self.record {
            tracing::trace!(document = %incoming.id, "remote record unchanged");
            return RemoteOutcome::Unchanged;
        }

        self.record = incoming;
        self.writes.cache(self.record.offline_snapshot());
        tracing::info!(
            document = %self.record.id,
            state = %self.record.state,
            current_power = self.record.current_power,
            "remote record adopted"
        );

        if self.record.state == DeviceState::Stop {
            tracing::warn!(document = %self.record.id, "stop requested by backend");
            self.host.request_poweroff();
            return RemoteOutcome::HostShutdown;
        }

        if self.policy.awaits_activation(&self.record) {
            return self.activate();
        }

        RemoteOutcome::Adopted
    }

    fn activate(&mut self) -> RemoteOutcome {
        let now = self.clock.now();
        let hardware = &self.hardware;
        let power = match validate_assignment(&self.record, |power| hardware.has_relay(power)) {
            Ok(power) => power,
            Err(error) => {
                tracing::warn!(
                    current_power = self.record.current_power,
                    error = %error,
                    "power assignment rejected"
                );
                self.writes
                    .remote(&self.record.id, self.policy.rejected(error, now), None);
                return RemoteOutcome::Rejected(error);
            }
        };

        if let Err(error) = self.energize_exclusively(power) {
            tracing::error!(power, error = %error, "failed to energize relay");
            self.fail_safe();
            self.writes.remote(
                &self.record.id,
                self.policy.fault(&format!("Relay fault: {error}"), now),
                None,
            );
            return RemoteOutcome::RelayFault;
        }

        tracing::info!(power, "charging session started");
        self.writes
            .remote(&self.record.id, self.policy.charging(now), None);
        RemoteOutcome::Activated(power)
    }

    fn energize_exclusively(&mut self, power: u32) -> Result<(), RelayError> {
        self.hardware.all_off()?;
        self.hardware.set_relay(power, true)
    }

    pub fn on_cable_edge(&mut self, connected: bool) {
        let now = self.clock.now();

        if !connected {
            match self.hardware.all_off() {
                Ok(()) => tracing::info!("cable disconnected, relays de-energized"),
                Err(error) => tracing::error!(error = %error, "cable disconnected but de-energizing failed"),
            }
        }

        if !self.policy.is_fresh(&self.record, now) {
            tracing::warn!(
                connected,
                age_ms = self.record.updated_at.age_at(now),
                "device record is stale, cable edge not reported"
            );
            return;
        }

        let patch = if connected {
            self.policy.connected(now)
        } else {
            self.policy.disconnected(now)
        };
        self.writes.remote(&self.record.id, patch, None);
    }

    pub fn on_heartbeat(&mut self, done: oneshot::Sender<()>) {
        let now = self.clock.now();
        let patch = self.policy.heartbeat(now, self.heartbeat_armed_offline);
        if patch.state.is_some() {
            tracing::info!(document = %self.record.id, "first heartbeat since offline, marking available");
        }

        patch.apply_to(&mut self.record);
        self.writes.remote(&self.record.id, patch, Some(done));
        self.heartbeat_armed_offline = self.record.state == DeviceState::Offline;
    }

    pub fn fail_safe(&mut self) {
        if let Err(error) = self.hardware.all_off() {
            tracing::error!(error = %error, "fail-safe de-energize failed");
        }
    }

    pub fn pending_writes(&self) -> usize {
        self.writes.in_flight()
    }

    pub fn reap_writes(&mut self) {
        self.writes.reap();
    }

    pub async fn shutdown(mut self) -> ShutdownReport {
        // Earlier writes must not land after the offline write.
        if !self.writes.drain(self.shutdown_timeout).await {
            tracing::warn!("in-flight writes abandoned before shutdown write");
        }

        let now = self.clock.now();
        let offline = self.policy.offline(now);
        let offline_written = match tokio::time::timeout(
            self.shutdown_timeout,
            self.store.merge(&self.record.id, &offline),
        )
        .await
        {
            Ok(Ok(())) => true,
            Ok(Err(error)) => {
                tracing::error!(error = %error, "shutdown write failed");
                false
            }
            Err(_) => {
                tracing::error!(timeout_ms = self.shutdown_timeout.as_millis() as u64, "shutdown write timed out");
                false
            }
        };

        let remote = match tokio::time::timeout(self.shutdown_timeout, self.store.get(&self.record.id)).await {
            Ok(Ok(Some(record))) => Some(record),
            Ok(Ok(None)) => {
                tracing::warn!(document = %self.record.id, "device record vanished before shutdown");
                None
            }
            Ok(Err(error)) => {
                tracing::warn!(error = %error, "could not read back device record");
                None
            }
            Err(_) => {
                tracing::warn!("reading back device record timed out");
                None
            }
        };

        let (snapshot, snapshot_source) = match remote {
            Some(record) => (record, SnapshotSource::Remote),
            None => {
                let mut record = self.record.clone();
                offline.apply_to(&mut record);
                (record, SnapshotSource::Local)
            }
        };

        let cache_saved = match self.cache.save(&snapshot) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(error = %error, "failed to persist shutdown snapshot");
                false
            }
        };

        self.fail_safe();
        let relays_released = match self.hardware.release() {
            Ok(()) => true,
            Err(error) => {
                tracing::error!(error = %error, "failed to release relay lines");
                false
            }
        };

        ShutdownReport {
            offline_written,
            snapshot_source,
            cache_saved,
            relays_released,
        }
    }
}
