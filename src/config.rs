//! Store and engine settings.
//!
//! Every setting has a default; the binary overrides them from `LEDGER_*`
//! environment variables.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name}: invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

/// Whether a debit may leave an account with a negative balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverdraftPolicy {
    #[default]
    Allow,
    Reject,
}

impl FromStr for OverdraftPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "allow" => Ok(OverdraftPolicy::Allow),
            "reject" => Ok(OverdraftPolicy::Reject),
            _ => Err(()),
        }
    }
}

/// Connection settings for the SQLite-backed store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// sqlx connection url, e.g. `sqlite://ledger.db`.
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// How long a writer waits for the database write lock.
    pub busy_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://ledger.db".to_string(),
            max_connections: 8,
            acquire_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Settings for [`TransferEngine`](crate::TransferEngine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Deadline for one `execute` call, ledger lookup through commit.
    pub timeout: Duration,
    pub overdraft: OverdraftPolicy,
    /// Upper bound on concurrent executions in [`TransferEngine::run`](crate::TransferEngine::run).
    pub max_in_flight: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            overdraft: OverdraftPolicy::Allow,
            max_in_flight: 16,
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(url) = lookup("LEDGER_DATABASE_URL") {
            config.url = url;
        }
        if let Some(max) = parse(&lookup, "LEDGER_MAX_CONNECTIONS")? {
            config.max_connections = max;
        }
        if let Some(ms) = parse(&lookup, "LEDGER_BUSY_TIMEOUT_MS")? {
            config.busy_timeout = Duration::from_millis(ms);
        }
        Ok(config)
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(ms) = parse(&lookup, "LEDGER_TIMEOUT_MS")? {
            config.timeout = Duration::from_millis(ms);
        }
        if let Some(policy) = parse(&lookup, "LEDGER_OVERDRAFT")? {
            config.overdraft = policy;
        }
        if let Some(max) = parse::<usize>(&lookup, "LEDGER_MAX_IN_FLIGHT")? {
            config.max_in_flight = max.max(1);
        }
        Ok(config)
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
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
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let store = StoreConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(store.url, "sqlite://ledger.db");
        assert_eq!(store.max_connections, 8);

        let engine = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(engine.overdraft, OverdraftPolicy::Allow);
        assert_eq!(engine.timeout, Duration::from_secs(10));
    }

    #[test]
    fn overrides_are_applied() {
        let store = StoreConfig::from_lookup(lookup(&[
            ("LEDGER_DATABASE_URL", "sqlite://other.db"),
            ("LEDGER_MAX_CONNECTIONS", "2"),
            ("LEDGER_BUSY_TIMEOUT_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(store.url, "sqlite://other.db");
        assert_eq!(store.max_connections, 2);
        assert_eq!(store.busy_timeout, Duration::from_millis(250));

        let engine = EngineConfig::from_lookup(lookup(&[
            ("LEDGER_TIMEOUT_MS", "1500"),
            ("LEDGER_OVERDRAFT", "Reject"),
            ("LEDGER_MAX_IN_FLIGHT", "0"),
        ]))
        .unwrap();
        assert_eq!(engine.timeout, Duration::from_millis(1500));
        assert_eq!(engine.overdraft, OverdraftPolicy::Reject);
        assert_eq!(engine.max_in_flight, 1);
    }

    #[test]
    fn invalid_value_is_reported() {
        let err = EngineConfig::from_lookup(lookup(&[("LEDGER_OVERDRAFT", "maybe")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                name: "LEDGER_OVERDRAFT",
                value: "maybe".to_string()
            }
        );

        let err = StoreConfig::from_lookup(lookup(&[("LEDGER_MAX_CONNECTIONS", "-1")])).unwrap_err();
        assert!(err.to_string().contains("LEDGER_MAX_CONNECTIONS"));
    }
}
