//! # Global runtime configuration.
//!
//! [`Config`] collects everything the process reads from the environment:
//! the three sibling-service hostnames, the database connection settings,
//! and the local bind address. It is read once at boot and passed down as
//! construction parameters; nothing else in the crate touches `std::env`.
//!
//! ## Environment variables
//! - `CONCORD_PRIORITY_QUEUE_HOST` — priority queue service host
//! - `CONCORD_TIMETABLE_HOST` — timetable service host
//! - `CONCORD_STATUS_CHANGE_NOTIFIER_HOST` — status change notifier host
//! - `CONCORD_BIND_ADDR` — local listen address (default `0.0.0.0:8080`)
//! - `ARANGODB_HOST`, `ARANGODB_NAME`, `ARANGODB_USER`, `ARANGODB_PASS` —
//!   document database connection

use std::env;
use std::net::SocketAddr;

use thiserror::Error;

/// Error raised when the environment is incomplete or malformed.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required environment variable is unset or empty.
    #[error("missing environment variable {0}")]
    Missing(&'static str),

    /// The bind address could not be parsed.
    #[error("invalid bind address '{addr}': {source}")]
    InvalidBindAddr {
        addr: String,
        source: std::net::AddrParseError,
    },
}

/// Hostnames of the three sibling services the controller coordinates.
#[derive(Clone, Debug)]
pub struct ServiceHosts {
    /// Priority queue service host.
    pub priority_queue: String,
    /// Timetable service host.
    pub timetable: String,
    /// Status change notifier service host.
    pub notifier: String,
}

/// Document database connection settings.
#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    /// Database endpoint, e.g. `http://arangodb:8529`.
    pub host: String,
    /// Database name.
    pub name: String,
    /// Basic-auth user.
    pub user: String,
    /// Basic-auth password.
    pub pass: String,
}

/// Process configuration, read once from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    /// Address the `/rpc` server binds to.
    pub bind_addr: SocketAddr,
    /// Sibling service hostnames.
    pub hosts: ServiceHosts,
    /// Document database connection.
    pub database: DatabaseConfig,
}

impl Config {
    /// Reads the configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind = env::var("CONCORD_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let bind_addr = bind
            .parse()
            .map_err(|source| ConfigError::InvalidBindAddr { addr: bind, source })?;

        Ok(Self {
            bind_addr,
            hosts: ServiceHosts {
                priority_queue: require("CONCORD_PRIORITY_QUEUE_HOST")?,
                timetable: require("CONCORD_TIMETABLE_HOST")?,
                notifier: require("CONCORD_STATUS_CHANGE_NOTIFIER_HOST")?,
            },
            database: DatabaseConfig {
                host: require("ARANGODB_HOST")?,
                name: require("ARANGODB_NAME")?,
                user: require("ARANGODB_USER")?,
                pass: require("ARANGODB_PASS")?,
            },
        })
    }
}

fn require(key: &'static str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(key)),
    }
}
