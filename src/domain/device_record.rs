use serde::{Deserialize, Deserializer, Serialize, de};

use crate::domain::clock::TimestampMs;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceState {
    #[default]
    Offline,
    Available,
    Pending,
    Charging,
    // Older single state for both "cable present" and "session active".
    Unavailable,
    Stop,
    Error,
}

impl DeviceState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Offline => "OFFLINE",
            Self::Available => "AVAILABLE",
            Self::Pending => "PENDING",
            Self::Charging => "CHARGING",
            Self::Unavailable => "UNAVAILABLE",
            Self::Stop => "STOP",
            Self::Error => "ERROR",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        let state = match name {
            "OFFLINE" => Self::Offline,
            // Older records name the connected-and-idle state ONLINE.
            "ONLINE" | "AVAILABLE" => Self::Available,
            "PENDING" => Self::Pending,
            "CHARGING" => Self::Charging,
            "UNAVAILABLE" => Self::Unavailable,
            "STOP" => Self::Stop,
            "ERROR" => Self::Error,
            _ => return None,
        };
        Some(state)
    }

    // Older caches store the state as its position in
    // OFFLINE, ONLINE, AVAILABLE, UNAVAILABLE, STOP, ERROR.
    fn from_ordinal(ordinal: i64) -> Option<Self> {
        let state = match ordinal {
            0 => Self::Offline,
            1 | 2 => Self::Available,
            3 => Self::Unavailable,
            4 => Self::Stop,
            5 => Self::Error,
            _ => return None,
        };
        Some(state)
    }
}

impl<'de> Deserialize<'de> for DeviceState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Name(String),
            Ordinal(i64),
        }

        match Raw::deserialize(deserializer) {
            Ok(Raw::Name(name)) => Self::from_name(&name)
                .ok_or_else(|| de::Error::custom(format!("unknown device state `{name}`"))),
            Ok(Raw::Ordinal(ordinal)) => Self::from_ordinal(ordinal)
                .ok_or_else(|| de::Error::custom(format!("unknown device state {ordinal}"))),
            Err(_) => Err(de::Error::custom(
                "device state must be a state name or a legacy ordinal",
            )),
        }
    }
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerType {
    #[serde(rename = "DC")]
    Dc,
    #[serde(rename = "AC")]
    Ac,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Billing {
    Time,
    Session,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerMode {
    #[serde(rename = "type")]
    pub kind: PowerType,
    pub power: u32,
    pub price: f64,
    pub billing: Billing,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Localisation {
    pub lat: f64,
    pub lng: f64,
}

// Equality is structural over every field; echoes of our own merge-writes compare equal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceRecord {
    #[serde(alias = "linkedID")]
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    pub name: String,
    pub message: String,
    pub state: DeviceState,
    pub current_power: u32,
    pub current_time_start: TimestampMs,
    #[serde(alias = "powerMode")]
    pub power_modes: Vec<PowerMode>,
    pub localisation: Localisation,
    pub created_at: TimestampMs,
    pub updated_at: TimestampMs,
}

impl DeviceRecord {
    pub fn has_uid(&self) -> bool {
        self.uid.as_deref().is_some_and(|uid| !uid.trim().is_empty())
    }

    pub fn power_mode(&self, power: u32) -> Option<&PowerMode> {
        self.power_modes.iter().find(|mode| mode.power == power)
    }

    pub fn session_active(&self) -> bool {
        !self.current_time_start.is_zero()
    }

    pub fn offline_snapshot(&self) -> DeviceRecord {
        DeviceRecord {
            state: DeviceState::Offline,
            current_power: 0,
            current_time_start: TimestampMs::ZERO,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<DeviceState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<TimestampMs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_power: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_time_start: Option<TimestampMs>,
}

impl RecordPatch {
    pub fn claim_uid(uid: &str) -> Self {
        Self {
            uid: Some(uid.to_string()),
            ..Self::default()
        }
    }

    pub fn field_paths(&self) -> Vec<&'static str> {
        let mut paths = Vec::new();
        if self.uid.is_some() {
            paths.push("uid");
        }
        if self.state.is_some() {
            paths.push("state");
        }
        if self.message.is_some() {
            paths.push("message");
        }
        if self.updated_at.is_some() {
            paths.push("updatedAt");
        }
        if self.current_power.is_some() {
            paths.push("currentPower");
        }
        if self.current_time_start.is_some() {
            paths.push("currentTimeStart");
        }
        paths
    }

    pub fn is_empty(&self) -> bool {
        self.field_paths().is_empty()
    }

    pub fn apply_to(&self, record: &mut DeviceRecord) {
        if let Some(uid) = &self.uid {
            record.uid = Some(uid.clone());
        }
        if let Some(state) = self.state {
            record.state = state;
        }
        if let Some(message) = &self.message {
            record.message = message.clone();
        }
        if let Some(updated_at) = self.updated_at {
            record.updated_at = updated_at;
        }
        if let Some(current_power) = self.current_power {
            record.current_power = current_power;
        }
        if let Some(current_time_start) = self.current_time_start {
            record.current_time_start = current_time_start;
        }
    }
}
