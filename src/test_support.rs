use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::adapters::device_store::{DeviceStore, RecordFeed, StoreError};
use crate::adapters::gpio::GpioError;
use crate::adapters::host_power::HostPower;
use crate::adapters::record_cache::{CacheError, RecordCache};
use crate::adapters::relay_bank::{HardwareIo, RelayError};
use crate::domain::clock::{Clock, TimestampMs};
use crate::domain::device_record::{
    Billing, DeviceRecord, DeviceState, Localisation, PowerMode, PowerType, RecordPatch,
};

pub const SAMPLE_UPDATED_AT: i64 = 1_700_000_000_000;

#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().expect("journal lock").push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().expect("journal lock").clone()
    }

    pub fn last_position(&self, prefix: &str) -> Option<usize> {
        self.entries()
            .iter()
            .rposition(|entry| entry.starts_with(prefix))
    }
}

pub fn sample_record() -> DeviceRecord {
    DeviceRecord {
        id: "doc-1".to_string(),
        uid: Some("uid-1".to_string()),
        name: "Garage".to_string(),
        message: "Disconnected".to_string(),
        state: DeviceState::Available,
        current_power: 0,
        current_time_start: TimestampMs::ZERO,
        power_modes: vec![
            PowerMode {
                kind: PowerType::Ac,
                power: 5,
                price: 0.25,
                billing: Billing::Time,
            },
            PowerMode {
                kind: PowerType::Dc,
                power: 22,
                price: 0.45,
                billing: Billing::Session,
            },
            PowerMode {
                kind: PowerType::Dc,
                power: 50,
                price: 0.6,
                billing: Billing::Session,
            },
        ],
        localisation: Localisation {
            lat: 48.85,
            lng: 2.35,
        },
        created_at: TimestampMs(SAMPLE_UPDATED_AT - 86_400_000),
        updated_at: TimestampMs(SAMPLE_UPDATED_AT),
    }
}

// Relays for powers 5 and 22; `50` is offered by `sample_record` but has no relay.
#[derive(Debug, Clone)]
pub struct RecordingRelays {
    powers: BTreeSet<u32>,
    energized: Arc<Mutex<BTreeMap<u32, bool>>>,
    journal: Journal,
    fail_writes: Arc<AtomicBool>,
}

impl RecordingRelays {
    pub fn new(journal: Journal) -> Self {
        let powers: BTreeSet<u32> = [5, 22].into_iter().collect();
        let energized = powers.iter().map(|power| (*power, false)).collect();
        Self {
            powers,
            energized: Arc::new(Mutex::new(energized)),
            journal,
            fail_writes: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn energized(&self) -> Vec<u32> {
        self.energized
            .lock()
            .expect("relay lock")
            .iter()
            .filter(|(_, on)| **on)
            .map(|(power, _)| *power)
            .collect()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check(&self, power: u32) -> Result<(), RelayError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RelayError::Gpio(GpioError::Io {
                pin: power,
                action: "write",
                source: io::Error::other("stuck"),
            }));
        }
        Ok(())
    }
}

impl HardwareIo for RecordingRelays {
    fn has_relay(&self, power: u32) -> bool {
        self.powers.contains(&power)
    }

    fn set_relay(&mut self, power: u32, energized: bool) -> Result<(), RelayError> {
        if !self.powers.contains(&power) {
            return Err(RelayError::UnknownRelay(power));
        }
        self.check(power)?;
        self.energized
            .lock()
            .expect("relay lock")
            .insert(power, energized);
        self.journal
            .push(format!("relay {power} {}", if energized { "on" } else { "off" }));
        Ok(())
    }

    fn all_off(&mut self) -> Result<(), RelayError> {
        self.check(0)?;
        for on in self.energized.lock().expect("relay lock").values_mut() {
            *on = false;
        }
        self.journal.push("relays all off");
        Ok(())
    }

    fn release(&mut self) -> Result<(), RelayError> {
        self.journal.push("relays released");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryDeviceStore {
    documents: Mutex<BTreeMap<String, DeviceRecord>>,
    merges: Mutex<Vec<(String, RecordPatch)>>,
    subscribers: Mutex<Vec<(String, mpsc::Sender<Result<DeviceRecord, StoreError>>)>>,
    fail_merges: AtomicBool,
    fail_reads: AtomicBool,
    journal: Journal,
}

impl MemoryDeviceStore {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            ..Self::default()
        }
    }

    pub fn with_record(journal: Journal, record: DeviceRecord) -> Self {
        let store = Self::new(journal);
        store.insert(record);
        store
    }

    pub fn insert(&self, record: DeviceRecord) {
        self.documents
            .lock()
            .expect("documents lock")
            .insert(record.id.clone(), record);
    }

    pub fn document(&self, id: &str) -> Option<DeviceRecord> {
        self.documents.lock().expect("documents lock").get(id).cloned()
    }

    pub fn merges(&self) -> Vec<(String, RecordPatch)> {
        self.merges.lock().expect("merges lock").clone()
    }

    pub fn fail_merges(&self, fail: bool) {
        self.fail_merges.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn unavailable() -> StoreError {
        StoreError::Status {
            status: 503,
            body: "unavailable".to_string(),
        }
    }
}

#[async_trait]
impl DeviceStore for MemoryDeviceStore {
    async fn get(&self, id: &str) -> Result<Option<DeviceRecord>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.journal.push(format!("get {id}"));
        Ok(self.document(id))
    }

    async fn find_by_uid(&self, uid: &str) -> Result<Vec<DeviceRecord>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.journal.push(format!("query uid {uid}"));
        Ok(self
            .documents
            .lock()
            .expect("documents lock")
            .values()
            .filter(|record| record.uid.as_deref() == Some(uid))
            .cloned()
            .collect())
    }

    async fn merge(&self, id: &str, patch: &RecordPatch) -> Result<(), StoreError> {
        if self.fail_merges.load(Ordering::SeqCst) {
            self.journal.push(format!("merge failed {id}"));
            return Err(Self::unavailable());
        }

        let updated = {
            let mut documents = self.documents.lock().expect("documents lock");
            let record = documents
                .get_mut(id)
                .ok_or_else(|| StoreError::Missing(id.to_string()))?;
            patch.apply_to(record);
            record.clone()
        };
        self.merges
            .lock()
            .expect("merges lock")
            .push((id.to_string(), patch.clone()));
        self.journal.push(format!(
            "merge {id} {}",
            patch
                .state
                .map(|state| state.as_str().to_string())
                .unwrap_or_else(|| patch.field_paths().join(","))
        ));

        for (watched, tx) in self.subscribers.lock().expect("subscribers lock").iter() {
            if watched == id {
                let _ = tx.try_send(Ok(updated.clone()));
            }
        }
        Ok(())
    }

    fn subscribe(&self, id: &str, _cancel: CancellationToken) -> RecordFeed {
        let (tx, rx) = mpsc::channel(16);
        if let Some(record) = self.document(id) {
            let _ = tx.try_send(Ok(record));
        }
        self.subscribers
            .lock()
            .expect("subscribers lock")
            .push((id.to_string(), tx));
        rx
    }
}

#[derive(Debug, Default)]
pub struct RecordingCache {
    stored: Mutex<Option<DeviceRecord>>,
    saved: Mutex<Vec<DeviceRecord>>,
    fail_saves: AtomicBool,
    journal: Journal,
}

impl RecordingCache {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            ..Self::default()
        }
    }

    pub fn saved(&self) -> Vec<DeviceRecord> {
        self.saved.lock().expect("cache lock").clone()
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl RecordCache for RecordingCache {
    fn load(&self) -> Result<DeviceRecord, CacheError> {
        self.stored
            .lock()
            .expect("cache lock")
            .clone()
            .ok_or_else(|| CacheError::Missing(PathBuf::from("memory")))
    }

    fn save(&self, record: &DeviceRecord) -> Result<(), CacheError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(CacheError::Write {
                path: PathBuf::from("memory"),
                source: io::Error::other("read-only"),
            });
        }
        *self.stored.lock().expect("cache lock") = Some(record.clone());
        self.saved.lock().expect("cache lock").push(record.clone());
        self.journal
            .push(format!("cache save {}", record.state.as_str()));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingHost {
    requests: AtomicUsize,
}

impl RecordingHost {
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl HostPower for RecordingHost {
    fn request_poweroff(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
pub struct SettableClock(Arc<AtomicI64>);

impl SettableClock {
    pub fn at(ms: i64) -> Self {
        Self(Arc::new(AtomicI64::new(ms)))
    }

    pub fn advance(&self, ms: i64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for SettableClock {
    fn now(&self) -> TimestampMs {
        TimestampMs(self.0.load(Ordering::SeqCst))
    }
}
