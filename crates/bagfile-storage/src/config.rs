//! Writer Configuration
//!
//! Controls the rate limits around the writer's external disk-space
//! collaborator:
//!
//! - **disk_check_interval_ms**: how often the [`SpaceCheck`] collaborator is
//!   consulted during `write` (default: 20 s)
//! - **warn_interval_ms**: how often a dropped-message warning is logged
//!   while writing is disabled (default: 5 s)
//!
//! Neither interval affects format correctness; both exist so a hot write
//! path neither stats the filesystem nor spams the log on every message.
//!
//! [`SpaceCheck`]: crate::writer::SpaceCheck

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BagConfig {
    /// Milliseconds between disk-space checks (default: 20 000)
    #[serde(default = "default_disk_check_interval_ms")]
    pub disk_check_interval_ms: u64,

    /// Milliseconds between dropped-message warnings (default: 5 000)
    #[serde(default = "default_warn_interval_ms")]
    pub warn_interval_ms: u64,
}

impl Default for BagConfig {
    fn default() -> Self {
        Self {
            disk_check_interval_ms: default_disk_check_interval_ms(),
            warn_interval_ms: default_warn_interval_ms(),
        }
    }
}

impl BagConfig {
    pub fn disk_check_interval(&self) -> Duration {
        Duration::from_millis(self.disk_check_interval_ms)
    }

    pub fn warn_interval(&self) -> Duration {
        Duration::from_millis(self.warn_interval_ms)
    }
}

fn default_disk_check_interval_ms() -> u64 {
    20_000
}

fn default_warn_interval_ms() -> u64 {
    5_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BagConfig::default();
        assert_eq!(config.disk_check_interval(), Duration::from_secs(20));
        assert_eq!(config.warn_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_serde_fills_missing_fields() {
        let config: BagConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.disk_check_interval_ms, 20_000);
        assert_eq!(config.warn_interval_ms, 5_000);
    }

    #[test]
    fn test_serde_roundtrip() {
        let config = BagConfig {
            disk_check_interval_ms: 1_000,
            warn_interval_ms: 250,
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: BagConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.disk_check_interval_ms, 1_000);
        assert_eq!(back.warn_interval_ms, 250);
    }
}
