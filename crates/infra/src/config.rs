//! Store configuration loaded from the environment.

use std::time::Duration;

use thiserror::Error;

pub const DATABASE_URL: &str = "DATABASE_URL";
pub const MAX_CONNECTIONS: &str = "GLAMPSTOCK_DB_MAX_CONNECTIONS";
pub const ACQUIRE_TIMEOUT_SECS: &str = "GLAMPSTOCK_DB_ACQUIRE_TIMEOUT_SECS";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has an invalid value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Connection settings for the Postgres transaction store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl StoreConfig {
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
    pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: Self::DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Self::DEFAULT_ACQUIRE_TIMEOUT,
        }
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (unset keys return `None`).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup(DATABASE_URL)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing(DATABASE_URL))?;

        let mut config = Self::new(database_url);

        if let Some(raw) = lookup(MAX_CONNECTIONS) {
            let n = parse_positive(MAX_CONNECTIONS, &raw)?;
            config.max_connections = u32::try_from(n).map_err(|e| ConfigError::Invalid {
                key: MAX_CONNECTIONS,
                value: raw.clone(),
                reason: e.to_string(),
            })?;
        }

        if let Some(raw) = lookup(ACQUIRE_TIMEOUT_SECS) {
            config.acquire_timeout = Duration::from_secs(parse_positive(ACQUIRE_TIMEOUT_SECS, &raw)?);
        }

        Ok(config)
    }
}

fn parse_positive(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason,
    };
    let n: u64 = raw.trim().parse().map_err(|e: std::num::ParseIntError| invalid(e.to_string()))?;
    if n == 0 {
        return Err(invalid("must be greater than zero".to_string()));
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_url_is_set() {
        let config = StoreConfig::from_lookup(lookup(&[(DATABASE_URL, "postgres://localhost/glamp")])).unwrap();
        assert_eq!(config, StoreConfig::new("postgres://localhost/glamp"));
    }

    #[test]
    fn missing_url_is_an_error() {
        assert_eq!(
            StoreConfig::from_lookup(lookup(&[])),
            Err(ConfigError::Missing(DATABASE_URL))
        );
        assert_eq!(
            StoreConfig::from_lookup(lookup(&[(DATABASE_URL, "  ")])),
            Err(ConfigError::Missing(DATABASE_URL))
        );
    }

    #[test]
    fn overrides_are_parsed() {
        let config = StoreConfig::from_lookup(lookup(&[
            (DATABASE_URL, "postgres://db/glamp"),
            (MAX_CONNECTIONS, "32"),
            (ACQUIRE_TIMEOUT_SECS, " 2 "),
        ]))
        .unwrap();
        assert_eq!(config.max_connections, 32);
        assert_eq!(config.acquire_timeout, Duration::from_secs(2));
    }

    #[test]
    fn zero_or_garbage_is_rejected() {
        for bad in ["0", "many", "-1"] {
            let err = StoreConfig::from_lookup(lookup(&[
                (DATABASE_URL, "postgres://db/glamp"),
                (MAX_CONNECTIONS, bad),
            ]))
            .unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { key: MAX_CONNECTIONS, .. }));
        }
    }
}
