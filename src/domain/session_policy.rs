use thiserror::Error;

use crate::domain::clock::TimestampMs;
use crate::domain::device_record::{DeviceRecord, DeviceState, RecordPatch};

pub const MESSAGE_CONNECTED: &str = "Connected";
pub const MESSAGE_DISCONNECTED: &str = "Disconnected";
pub const MESSAGE_CHARGING: &str = "Charging";
pub const MESSAGE_OFFLINE: &str = "Offline";

// `PendingCharging` distinguishes "cable present, awaiting a profile" (`PENDING`) from
// "session running" (`CHARGING`); `Unavailable` is the older single-state naming where both are
// `UNAVAILABLE` and only `currentTimeStart` tells them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateNaming {
    PendingCharging,
    Unavailable,
}

impl StateNaming {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending-charging" | "pending_charging" => Some(Self::PendingCharging),
            "unavailable" => Some(Self::Unavailable),
            _ => None,
        }
    }

    pub fn awaiting_profile(self) -> DeviceState {
        match self {
            Self::PendingCharging => DeviceState::Pending,
            Self::Unavailable => DeviceState::Unavailable,
        }
    }

    pub fn session_active(self) -> DeviceState {
        match self {
            Self::PendingCharging => DeviceState::Charging,
            Self::Unavailable => DeviceState::Unavailable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AssignmentError {
    #[error("power profile {0} is not offered by this station")]
    UnknownProfile(u32),
    #[error("no relay configured for power {0}")]
    NoRelay(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    pub naming: StateNaming,
    pub staleness_threshold_ms: i64,
}

impl SessionPolicy {
    pub fn is_fresh(&self, record: &DeviceRecord, now: TimestampMs) -> bool {
        record.updated_at.age_at(now) < self.staleness_threshold_ms
    }

    pub fn awaits_activation(&self, record: &DeviceRecord) -> bool {
        record.state == self.naming.awaiting_profile()
            && record.current_power != 0
            && !record.session_active()
    }

    pub fn connected(&self, now: TimestampMs) -> RecordPatch {
        session_reset(self.naming.awaiting_profile(), MESSAGE_CONNECTED, now)
    }

    pub fn disconnected(&self, now: TimestampMs) -> RecordPatch {
        session_reset(DeviceState::Available, MESSAGE_DISCONNECTED, now)
    }

    pub fn charging(&self, now: TimestampMs) -> RecordPatch {
        RecordPatch {
            state: Some(self.naming.session_active()),
            message: Some(MESSAGE_CHARGING.to_string()),
            updated_at: Some(now),
            current_time_start: Some(now),
            ..RecordPatch::default()
        }
    }

    pub fn rejected(&self, error: AssignmentError, now: TimestampMs) -> RecordPatch {
        session_reset(DeviceState::Error, &error.to_string(), now)
    }

    pub fn fault(&self, message: &str, now: TimestampMs) -> RecordPatch {
        session_reset(DeviceState::Error, message, now)
    }

    pub fn offline(&self, now: TimestampMs) -> RecordPatch {
        session_reset(DeviceState::Offline, MESSAGE_OFFLINE, now)
    }

    // A cycle armed while the record was `OFFLINE` also brings it back online.
    pub fn heartbeat(&self, now: TimestampMs, armed_while_offline: bool) -> RecordPatch {
        RecordPatch {
            state: armed_while_offline.then_some(DeviceState::Available),
            updated_at: Some(now),
            ..RecordPatch::default()
        }
    }
}

fn session_reset(state: DeviceState, message: &str, now: TimestampMs) -> RecordPatch {
    RecordPatch {
        state: Some(state),
        message: Some(message.to_string()),
        updated_at: Some(now),
        current_power: Some(0),
        current_time_start: Some(TimestampMs::ZERO),
        ..RecordPatch::default()
    }
}

pub fn validate_assignment<F>(record: &DeviceRecord, has_relay: F) -> Result<u32, AssignmentError>
where
    F: Fn(u32) -> bool,
{
    let power = record.current_power;
    if record.power_mode(power).is_none() {
        return Err(AssignmentError::UnknownProfile(power));
    }
    if !has_relay(power) {
        return Err(AssignmentError::NoRelay(power));
    }
    Ok(power)
}
