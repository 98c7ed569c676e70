use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TimestampMs(pub i64);

impl TimestampMs {
    pub const ZERO: TimestampMs = TimestampMs(0);

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn age_at(self, now: TimestampMs) -> i64 {
        now.0.saturating_sub(self.0)
    }
}

pub trait Clock {
    fn now(&self) -> TimestampMs;
}
