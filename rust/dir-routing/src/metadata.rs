use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

fn unix_now() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_secs(),
        Err(_) => 0,
    }
}

/// Bookkeeping stored against every label key: when the label was first
/// recorded and when its record was last seen announced. Serialized as JSON.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct LabelMetadata {
    /// Seconds from Unix epoch at which the label was created
    pub timestamp: u64,
    /// Seconds from Unix epoch at which the label was last refreshed
    pub last_seen: u64,
}

impl LabelMetadata {
    /// Fresh metadata with both instants set to now
    pub fn now() -> Self {
        let now = unix_now();
        LabelMetadata {
            timestamp: now,
            last_seen: now,
        }
    }

    /// Enforces the invariants: both instants non-zero and `last_seen`
    /// not before `timestamp`
    pub fn validate(&self) -> Result<()> {
        if self.timestamp == 0 || self.last_seen == 0 {
            return Err(anyhow!("label metadata has a zero timestamp"));
        }
        if self.last_seen < self.timestamp {
            return Err(anyhow!("label metadata was last seen before it was created"));
        }
        Ok(())
    }

    /// Whether `last_seen` is older than `max_age`
    pub fn is_stale(&self, max_age: Duration) -> bool {
        unix_now().saturating_sub(self.last_seen) > max_age.as_secs()
    }

    /// Refresh `last_seen` to now
    pub fn update(&mut self) {
        self.last_seen = unix_now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_validates_well_formed_metadata() {
        assert!(LabelMetadata::now().validate().is_ok());
        assert!(LabelMetadata {
            timestamp: 0,
            last_seen: 0
        }
        .validate()
        .is_err());
        assert!(LabelMetadata {
            timestamp: 100,
            last_seen: 99
        }
        .validate()
        .is_err());
    }

    #[test]
    fn it_is_stale_beyond_max_age() {
        let max_age = Duration::from_secs(72 * 60 * 60);
        let now = unix_now();

        let fresh = LabelMetadata {
            timestamp: now - 2 * 60 * 60,
            last_seen: now - 60 * 60,
        };
        assert!(!fresh.is_stale(max_age));

        let stale = LabelMetadata {
            timestamp: now - 74 * 60 * 60,
            last_seen: now - 73 * 60 * 60,
        };
        assert!(stale.is_stale(max_age));

        // Exactly at the boundary is not yet stale.
        let boundary = LabelMetadata {
            timestamp: now - 72 * 60 * 60,
            last_seen: now - 72 * 60 * 60,
        };
        assert!(!boundary.is_stale(max_age));
    }

    #[test]
    fn it_refreshes_last_seen() {
        let mut metadata = LabelMetadata {
            timestamp: 100,
            last_seen: 100,
        };
        metadata.update();
        assert!(metadata.last_seen >= unix_now() - 1);
        assert_eq!(metadata.timestamp, 100);
    }

    #[test]
    fn it_serializes_as_json() -> Result<()> {
        let metadata = LabelMetadata {
            timestamp: 100,
            last_seen: 200,
        };
        let encoded = serde_json::to_string(&metadata)?;
        assert_eq!(encoded, r#"{"timestamp":100,"last_seen":200}"#);
        assert_eq!(serde_json::from_str::<LabelMetadata>(&encoded)?, metadata);
        Ok(())
    }
}
