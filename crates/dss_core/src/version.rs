use std::fmt;

use crate::time::Timestamp;
use crate::{DssError, DssResult};

// 32 is the highest radix strconv-style formatting supports; changing the
// radix breaks read-modify-write for existing clients.
const VERSION_RADIX: u64 = 32;
const VERSION_DIGITS: &[u8; 32] = b"0123456789abcdefghijklmnopqrstuv";

/// Per-entity optimistic-concurrency token: the lowercase base-32 rendering
/// of the entity's `updated_at` nanosecond epoch. The empty version marks a
/// fresh, unsaved entity; on delete it acts as the force token.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Version(String);

impl Version {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn from_timestamp(ts: Timestamp) -> Self {
        let mut value = ts.as_nanos() as u64;
        if value == 0 {
            return Self("0".to_string());
        }
        let mut buf = [0u8; 13];
        let mut at = buf.len();
        while value > 0 {
            at -= 1;
            buf[at] = VERSION_DIGITS[(value % VERSION_RADIX) as usize];
            value /= VERSION_RADIX;
        }
        Self(String::from_utf8_lossy(&buf[at..]).into_owned())
    }

    pub fn to_timestamp(&self) -> DssResult<Timestamp> {
        if self.0.is_empty() {
            return Err(DssError::bad_input("empty version"));
        }
        let nanos = u64::from_str_radix(&self.0, VERSION_RADIX as u32)
            .map_err(|err| DssError::bad_input(format!("invalid version '{}': {err}", self.0)))?;
        Ok(Timestamp::from_nanos(nanos as i64))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::Version;
    use crate::time::Timestamp;

    #[test]
    fn encodes_known_values() {
        assert_eq!(Version::from_timestamp(Timestamp(0)).as_str(), "0");
        assert_eq!(Version::from_timestamp(Timestamp(31)).as_str(), "v");
        assert_eq!(Version::from_timestamp(Timestamp(32)).as_str(), "10");
        assert_eq!(Version::from_timestamp(Timestamp(1024)).as_str(), "100");
    }

    #[test]
    fn roundtrips_through_text() {
        let ts = Timestamp(1_698_000_123_456_789_000);
        let version = Version::from_timestamp(ts);
        assert_eq!(version.to_timestamp().expect("parse"), ts);
    }

    #[test]
    fn same_timestamp_same_version() {
        let ts = Timestamp(42_000_000_007);
        assert_eq!(Version::from_timestamp(ts), Version::from_timestamp(ts));
    }

    #[test]
    fn rejects_empty_and_garbage() {
        assert!(Version::empty().to_timestamp().is_err());
        assert!(Version::new("!!!").to_timestamp().is_err());
    }
}
