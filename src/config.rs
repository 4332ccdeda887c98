use crate::live::ConnectedPolicy;
use std::{env, fmt::Display, net::SocketAddr, str::FromStr};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("environment variable {0} is required")]
    Missing(&'static str),
    #[error("invalid {key} value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub db_max_connections: u32,
    pub vote_min_interval_ms: u32,
    pub feed_capacity: usize,
    pub connected_policy: ConnectedPolicy,
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        Ok(Self {
            database_url,
            bind_addr: try_load(&lookup, "BIND_ADDR", "0.0.0.0:8080")?,
            db_max_connections: try_load(&lookup, "DB_MAX_CONNECTIONS", "20")?,
            vote_min_interval_ms: try_load(&lookup, "VOTE_MIN_INTERVAL_MS", "1000")?,
            feed_capacity: try_load(&lookup, "FEED_CAPACITY", "100")?,
            connected_policy: try_load(&lookup, "LIVE_CONNECTED_POLICY", "last")?,
        })
    }
}

fn try_load<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: &str,
) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let value = lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
        value,
    })
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
    fn defaults_fill_everything_but_the_database() {
        let config = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/votes")]))
            .unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.db_max_connections, 20);
        assert_eq!(config.vote_min_interval_ms, 1000);
        assert_eq!(config.feed_capacity, 100);
        assert_eq!(config.connected_policy, ConnectedPolicy::LastObserved);
    }

    #[test]
    fn database_url_is_required() {
        assert_eq!(
            Config::from_lookup(lookup(&[])).unwrap_err(),
            ConfigError::Missing("DATABASE_URL")
        );
    }

    #[test]
    fn bad_values_name_the_key() {
        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/votes"),
            ("BIND_ADDR", "not-an-address"),
        ]))
        .unwrap_err();

        assert!(matches!(err, ConfigError::Invalid { key: "BIND_ADDR", .. }));
    }

    #[test]
    fn negative_vote_interval_is_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/votes"),
            ("VOTE_MIN_INTERVAL_MS", "-5"),
        ]))
        .unwrap_err();

        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "VOTE_MIN_INTERVAL_MS",
                ..
            }
        ));
    }

    #[test]
    fn policy_is_configurable() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/votes"),
            ("LIVE_CONNECTED_POLICY", "all"),
        ]))
        .unwrap();

        assert_eq!(config.connected_policy, ConnectedPolicy::AllSubscribed);
    }
}
