use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Nanoseconds since the Unix epoch.
///
/// Commit timestamps double as the optimistic-concurrency token, so `now`
/// must never hand out the same value twice within a process even if the
/// wall clock stalls or steps backwards.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Timestamp(pub i64);

static LAST_STAMP: Lazy<Mutex<i64>> = Lazy::new(|| Mutex::new(0));

impl Timestamp {
    pub fn now() -> Self {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as i64;
        let mut guard = LAST_STAMP.lock().expect("timestamp mutex poisoned");
        let next = if wall > *guard { wall } else { *guard + 1 };
        *guard = next;
        Timestamp(next)
    }

    pub fn as_nanos(self) -> i64 {
        self.0
    }

    pub fn from_nanos(value: i64) -> Self {
        Timestamp(value)
    }

    pub fn to_datetime(self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.0)
    }

    /// `None` when the instant falls outside the nanosecond-epoch range.
    pub fn from_datetime(value: DateTime<Utc>) -> Option<Self> {
        value.timestamp_nanos_opt().map(Timestamp)
    }
}

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(self.0)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = i64::deserialize(deserializer)?;
        Ok(Timestamp(value))
    }
}

#[cfg(test)]
mod tests {
    use super::Timestamp;
    use chrono::{DateTime, Utc};

    #[test]
    fn now_is_strictly_increasing() {
        let a = Timestamp::now();
        let b = Timestamp::now();
        let c = Timestamp::now();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn datetime_roundtrip_preserves_nanos() {
        let ts = Timestamp(1_234_567_890_123_456_789);
        let dt: DateTime<Utc> = ts.to_datetime();
        assert_eq!(Timestamp::from_datetime(dt), Some(ts));
    }
}
