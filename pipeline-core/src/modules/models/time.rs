use serde::{Deserialize, Serialize};

const NANOS_PER_SEC: u64 = 1_000_000_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Time {
    pub sec: u32,
    pub nsec: u32,
}

impl Time {
    pub const MAX: Time = Time {
        sec: u32::MAX,
        nsec: (NANOS_PER_SEC - 1) as u32,
    };

    pub fn new(sec: u32, nsec: u32) -> Self {
        // Carry nanosecond overflow into seconds
        let total = sec as u64 * NANOS_PER_SEC + nsec as u64;
        Self::from_nanos(total)
    }

    /// Saturates at the largest representable time.
    pub fn from_nanos(nanos: u64) -> Self {
        match u32::try_from(nanos / NANOS_PER_SEC) {
            Ok(sec) => Time {
                sec,
                nsec: (nanos % NANOS_PER_SEC) as u32,
            },
            Err(_) => Time::MAX,
        }
    }

    pub fn from_seconds(seconds: f64) -> Self {
        if seconds <= 0.0 {
            return Time::default();
        }
        Self::from_nanos((seconds * NANOS_PER_SEC as f64).round() as u64)
    }

    pub fn to_nanos(&self) -> u64 {
        self.sec as u64 * NANOS_PER_SEC + self.nsec as u64
    }

    pub fn to_seconds(&self) -> f64 {
        self.sec as f64 + self.nsec as f64 / NANOS_PER_SEC as f64
    }

    pub fn add_seconds(&self, seconds: f64) -> Self {
        Self::from_seconds(self.to_seconds() + seconds)
    }
}
