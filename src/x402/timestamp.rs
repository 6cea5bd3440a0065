use std::fmt::{self, Display, Formatter};
use std::ops::Add;
use std::time::{SystemTime, SystemTimeError, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Seconds since the Unix epoch, serialized as a decimal string
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnixTimestamp(pub u64);

impl UnixTimestamp {
    pub fn try_now() -> Result<Self, SystemTimeError> {
        let elapsed = SystemTime::now().duration_since(UNIX_EPOCH)?;
        Ok(Self(elapsed.as_secs()))
    }

    pub fn seconds_since_epoch(&self) -> u64 {
        self.0
    }
}

impl Add<u64> for UnixTimestamp {
    type Output = UnixTimestamp;

    fn add(self, rhs: u64) -> Self::Output {
        UnixTimestamp(self.0.saturating_add(rhs))
    }
}

impl Display for UnixTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for UnixTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for UnixTimestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<u64>()
            .map(UnixTimestamp)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_as_string() {
        let ts = UnixTimestamp(1_700_000_000);
        assert_eq!(serde_json::to_string(&ts).unwrap(), "\"1700000000\"");
        let back: UnixTimestamp = serde_json::from_str("\"1700000000\"").unwrap();
        assert_eq!(back, ts);
    }

    #[test]
    fn test_add_saturates() {
        assert_eq!(UnixTimestamp(u64::MAX) + 5, UnixTimestamp(u64::MAX));
        assert_eq!(UnixTimestamp(10) + 5, UnixTimestamp(15));
    }
}
