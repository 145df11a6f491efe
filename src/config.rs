use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::engine::EngineSettings;
use crate::interval::DayBounds;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Invalid { var: &'static str, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid { var, value } => write!(f, "invalid value for {var}: {value:?}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Server configuration, read from `COURTBOOK_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub facilities_file: PathBuf,
    pub max_connections: usize,
    pub metrics_port: Option<u16>,
    pub dependency_timeout: Duration,
    pub day_bounds: DayBounds,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 7420,
            data_dir: PathBuf::from("./data"),
            facilities_file: PathBuf::from("./facilities.json"),
            max_connections: 256,
            metrics_port: None,
            dependency_timeout: Duration::from_millis(2000),
            day_bounds: DayBounds::NextDay,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Config::default();
        if let Some(v) = lookup("COURTBOOK_BIND") {
            config.bind = v;
        }
        if let Some(v) = parsed(&lookup, "COURTBOOK_PORT")? {
            config.port = v;
        }
        if let Some(v) = lookup("COURTBOOK_DATA_DIR") {
            config.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("COURTBOOK_FACILITIES") {
            config.facilities_file = PathBuf::from(v);
        }
        if let Some(v) = parsed(&lookup, "COURTBOOK_MAX_CONNECTIONS")? {
            config.max_connections = v;
        }
        config.metrics_port = parsed(&lookup, "COURTBOOK_METRICS_PORT")?;
        if let Some(ms) = parsed::<u64>(&lookup, "COURTBOOK_DEPENDENCY_TIMEOUT_MS")? {
            if ms == 0 {
                return Err(ConfigError::Invalid {
                    var: "COURTBOOK_DEPENDENCY_TIMEOUT_MS",
                    value: ms.to_string(),
                });
            }
            config.dependency_timeout = Duration::from_millis(ms);
        }
        if let Some(v) = parsed(&lookup, "COURTBOOK_DAY_BOUNDS")? {
            config.day_bounds = v;
        }
        Ok(config)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("reservations.wal")
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            dependency_timeout: self.dependency_timeout,
            day_bounds: self.day_bounds,
        }
    }
}

fn parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.listen_addr(), "0.0.0.0:7420");
        assert_eq!(config.wal_path(), PathBuf::from("./data/reservations.wal"));
        assert_eq!(config.engine_settings(), EngineSettings::default());
    }

    #[test]
    fn overrides_are_applied() {
        let config = Config::from_lookup(lookup_from(&[
            ("COURTBOOK_PORT", "9000"),
            ("COURTBOOK_DATA_DIR", "/var/lib/courtbook"),
            ("COURTBOOK_METRICS_PORT", "9100"),
            ("COURTBOOK_DEPENDENCY_TIMEOUT_MS", "250"),
            ("COURTBOOK_DAY_BOUNDS", "same_day"),
        ]))
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.metrics_port, Some(9100));
        assert_eq!(config.dependency_timeout, Duration::from_millis(250));
        assert_eq!(config.day_bounds, DayBounds::SameDay);
        assert_eq!(config.wal_path(), PathBuf::from("/var/lib/courtbook/reservations.wal"));
    }

    #[test]
    fn malformed_values_are_errors() {
        let err = Config::from_lookup(lookup_from(&[("COURTBOOK_PORT", "seventy")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                var: "COURTBOOK_PORT",
                value: "seventy".into()
            }
        );
        assert!(Config::from_lookup(lookup_from(&[("COURTBOOK_DAY_BOUNDS", "tomorrow")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("COURTBOOK_DEPENDENCY_TIMEOUT_MS", "0")])).is_err());
    }
}
