//! flowgate.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FlowgateConfig {
    pub daemon: Option<DaemonConfig>,
    pub sweep: Option<SweepConfig>,
    pub engine: Option<EngineConfig>,
    pub incidents: Option<CollaboratorConfig>,
    pub variables: Option<CollaboratorConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DaemonConfig {
    pub port: Option<u16>,
    pub data_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SweepConfig {
    /// How often the daemon sweeper runs (e.g. "30m").
    pub interval: Option<String>,
    /// Deployments younger than this are never treated as drift
    /// (e.g. "6h").
    pub age_buffer: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// Per-request timeout for engine calls (e.g. "30s").
    pub request_timeout: Option<String>,
}

/// Address of an auxiliary collaborator service (incident handling,
/// process-IO variables).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CollaboratorConfig {
    pub base_url: String,
}

impl FlowgateConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: FlowgateConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep
            .as_ref()
            .and_then(|s| s.interval.as_deref())
            .and_then(parse_duration)
            .unwrap_or(Duration::from_secs(30 * 60))
    }

    pub fn sweep_age_buffer(&self) -> Duration {
        self.sweep
            .as_ref()
            .and_then(|s| s.age_buffer.as_deref())
            .and_then(parse_duration)
            .unwrap_or(Duration::from_secs(6 * 60 * 60))
    }

    pub fn engine_request_timeout(&self) -> Duration {
        self.engine
            .as_ref()
            .and_then(|e| e.request_timeout.as_deref())
            .and_then(parse_duration)
            .unwrap_or(Duration::from_secs(30))
    }
}

/// Parse a duration string like "500ms", "30s", "15m", "6h".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else if let Some(hours) = s.strip_suffix('h') {
        hours
            .parse::<u64>()
            .ok()
            .map(|h| Duration::from_secs(h * 3600))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal() {
        let toml_str = r#"
[daemon]
port = 9400

[incidents]
base_url = "http://incidents.internal"
"#;
        let config: FlowgateConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.daemon.unwrap().port, Some(9400));
        assert_eq!(
            config.incidents.unwrap().base_url,
            "http://incidents.internal"
        );
        assert!(config.sweep.is_none());
    }

    #[test]
    fn defaults_apply_when_sections_missing() {
        let config = FlowgateConfig::default();
        assert_eq!(config.sweep_interval(), Duration::from_secs(1800));
        assert_eq!(config.sweep_age_buffer(), Duration::from_secs(21600));
        assert_eq!(config.engine_request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn sweep_settings_parse() {
        let toml_str = r#"
[sweep]
interval = "5m"
age_buffer = "2h"
"#;
        let config: FlowgateConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.sweep_interval(), Duration::from_secs(300));
        assert_eq!(config.sweep_age_buffer(), Duration::from_secs(7200));
    }

    #[test]
    fn round_trips_through_toml() {
        let config = FlowgateConfig {
            daemon: Some(DaemonConfig {
                port: Some(9400),
                data_dir: Some("/var/lib/flowgate".to_string()),
            }),
            ..Default::default()
        };
        let rendered = config.to_toml_string().unwrap();
        let back: FlowgateConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(back.daemon.unwrap().port, Some(9400));
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("15m"), Some(Duration::from_secs(900)));
        assert_eq!(parse_duration("6h"), Some(Duration::from_secs(21600)));
        assert_eq!(parse_duration("10"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("junk"), None);
    }
}
