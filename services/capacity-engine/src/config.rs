use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use fleetcap_reconcile::{
    Thresholds, DEFAULT_CRITICAL_PCT, DEFAULT_HYSTERESIS_PCT, DEFAULT_POLL_INTERVAL,
    DEFAULT_WARNING_PCT,
};
use thiserror::Error;

use crate::registry::DEFAULT_MAX_SERVERS;

/// Default depth of the fleet event channel feeding the reconciler.
pub const DEFAULT_FLEET_EVENT_BUFFER: usize = 256;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{var}: cannot parse '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("{var}: {reason}")]
    OutOfRange { var: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: String,
    pub max_servers: usize,
    pub monitor_interval: Duration,
    pub thresholds: Thresholds,
    pub fleet_event_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            log_level: "info".to_string(),
            max_servers: DEFAULT_MAX_SERVERS,
            monitor_interval: DEFAULT_POLL_INTERVAL,
            thresholds: Thresholds::default(),
            fleet_event_buffer: DEFAULT_FLEET_EVENT_BUFFER,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any variable source. Unset variables take their
    /// defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let listen_addr = parse_or(&lookup, "FLEETCAP_LISTEN_ADDR", defaults.listen_addr)?;
        let log_level = lookup("FLEETCAP_LOG_LEVEL").unwrap_or(defaults.log_level);

        let max_servers = parse_or(&lookup, "FLEETCAP_MAX_SERVERS", defaults.max_servers)?;
        if max_servers == 0 {
            return Err(ConfigError::OutOfRange {
                var: "FLEETCAP_MAX_SERVERS",
                reason: "must be at least 1".to_string(),
            });
        }

        let interval_secs = parse_or(
            &lookup,
            "FLEETCAP_MONITOR_INTERVAL_SECS",
            defaults.monitor_interval.as_secs(),
        )?;
        if interval_secs == 0 {
            return Err(ConfigError::OutOfRange {
                var: "FLEETCAP_MONITOR_INTERVAL_SECS",
                reason: "must be at least 1".to_string(),
            });
        }

        let thresholds = Thresholds {
            warning_pct: parse_or(&lookup, "FLEETCAP_WARNING_PCT", DEFAULT_WARNING_PCT)?,
            critical_pct: parse_or(&lookup, "FLEETCAP_CRITICAL_PCT", DEFAULT_CRITICAL_PCT)?,
            hysteresis_pct: parse_or(&lookup, "FLEETCAP_HYSTERESIS_PCT", DEFAULT_HYSTERESIS_PCT)?,
        };
        thresholds
            .validate()
            .map_err(|e| ConfigError::OutOfRange {
                var: "FLEETCAP_*_PCT",
                reason: e.to_string(),
            })?;

        let fleet_event_buffer = parse_or(
            &lookup,
            "FLEETCAP_FLEET_EVENT_BUFFER",
            defaults.fleet_event_buffer,
        )?;
        if fleet_event_buffer == 0 {
            return Err(ConfigError::OutOfRange {
                var: "FLEETCAP_FLEET_EVENT_BUFFER",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            listen_addr,
            log_level,
            max_servers,
            monitor_interval: Duration::from_secs(interval_secs),
            thresholds,
            fleet_event_buffer,
        })
    }
}

fn parse_or<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.listen_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.max_servers, 200);
        assert_eq!(config.monitor_interval, Duration::from_secs(30));
        assert_eq!(config.thresholds, Thresholds::default());
        assert_eq!(config.fleet_event_buffer, 256);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("FLEETCAP_LISTEN_ADDR", "0.0.0.0:9000"),
            ("FLEETCAP_MAX_SERVERS", "50"),
            ("FLEETCAP_WARNING_PCT", "70"),
            ("FLEETCAP_CRITICAL_PCT", "85.5"),
        ]))
        .unwrap();
        assert_eq!(config.listen_addr.port(), 9000);
        assert_eq!(config.max_servers, 50);
        assert_eq!(config.thresholds.warning_pct, 70.0);
        assert_eq!(config.thresholds.critical_pct, 85.5);
    }

    #[test]
    fn test_unparseable_value() {
        let err = Config::from_lookup(lookup(&[("FLEETCAP_MAX_SERVERS", "lots")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                var: "FLEETCAP_MAX_SERVERS",
                ..
            }
        ));
    }

    #[test]
    fn test_inverted_thresholds() {
        let err = Config::from_lookup(lookup(&[
            ("FLEETCAP_WARNING_PCT", "95"),
            ("FLEETCAP_CRITICAL_PCT", "90"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { .. }));
    }

    #[test]
    fn test_zero_interval() {
        let err = Config::from_lookup(lookup(&[("FLEETCAP_MONITOR_INTERVAL_SECS", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { .. }));
    }
}
