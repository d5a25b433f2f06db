//! Metrics reporting configuration
//!
//! Counters are always collected; this section only controls the periodic
//! reporter that logs them.

use serde::Deserialize;
use std::time::Duration;

/// Metrics reporting configuration
///
/// # Example
///
/// ```toml
/// [metrics]
/// enabled = true
/// interval = "30s"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable periodic reporting
    /// Default: true
    pub enabled: bool,

    /// Reporting interval
    /// Default: 60s
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MetricsConfig::default();
        assert!(config.enabled);
        assert_eq!(config.interval, Duration::from_secs(60));
    }

    #[test]
    fn test_deserialize_full() {
        let config: MetricsConfig =
            toml::from_str("enabled = false\ninterval = \"5s\"").unwrap();
        assert!(!config.enabled);
        assert_eq!(config.interval, Duration::from_secs(5));
    }
}
