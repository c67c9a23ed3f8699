//! # Configuration
//!
//! Poll cadence and per-verb deadlines. Durations are expressed in whole
//! seconds on the wire:
//!
//! ```json
//! { "poll_interval_secs": 60, "timeouts": { "create_secs": 1800, "read_secs": 300 } }
//! ```
//!
//! Missing fields fall back to [`ReconcileConfig::default`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The four reconciliation verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Create,
    Read,
    Update,
    Delete,
}

/// Deadline budget per verb.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    #[serde(rename = "create_secs", with = "secs")]
    pub create: Duration,
    #[serde(rename = "read_secs", with = "secs")]
    pub read: Duration,
    #[serde(rename = "update_secs", with = "secs")]
    pub update: Duration,
    #[serde(rename = "delete_secs", with = "secs")]
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: Duration::from_secs(30 * 60),
            read: Duration::from_secs(5 * 60),
            update: Duration::from_secs(30 * 60),
            delete: Duration::from_secs(30 * 60),
        }
    }
}

impl Timeouts {
    pub fn for_verb(&self, verb: Verb) -> Duration {
        match verb {
            Verb::Create => self.create,
            Verb::Read => self.read,
            Verb::Update => self.update,
            Verb::Delete => self.delete,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Interval between LRO status polls.
    #[serde(rename = "poll_interval_secs", with = "secs")]
    pub poll_interval: Duration,
    /// Wait before the first poll of a freshly accepted operation.
    #[serde(rename = "poll_delay_secs", with = "secs")]
    pub poll_delay: Duration,
    pub timeouts: Timeouts,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            poll_delay: Duration::ZERO,
            timeouts: Timeouts::default(),
        }
    }
}

impl ReconcileConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = delay;
        self
    }

    pub fn with_timeout(mut self, verb: Verb, timeout: Duration) -> Self {
        match verb {
            Verb::Create => self.timeouts.create = timeout,
            Verb::Read => self.timeouts.read = timeout,
            Verb::Update => self.timeouts.update = timeout,
            Verb::Delete => self.timeouts.delete = timeout,
        }
        self
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ReconcileConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.timeouts.for_verb(Verb::Read), Duration::from_secs(300));
        assert_eq!(config.timeouts.for_verb(Verb::Delete), Duration::from_secs(1800));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ReconcileConfig =
            serde_json::from_str(r#"{ "poll_interval_secs": 10, "timeouts": { "create_secs": 90 } }"#).unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.poll_delay, Duration::ZERO);
        assert_eq!(config.timeouts.create, Duration::from_secs(90));
        assert_eq!(config.timeouts.update, Duration::from_secs(1800));
    }

    #[test]
    fn test_serialises_whole_seconds() {
        let config = ReconcileConfig::default().with_timeout(Verb::Update, Duration::from_secs(42));
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["poll_interval_secs"], 60);
        assert_eq!(json["timeouts"]["update_secs"], 42);
    }
}
