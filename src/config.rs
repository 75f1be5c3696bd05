//! Server Configuration
//!
//! Defaults, overlaid by `GRIDHOLD_*` environment variables, overlaid in
//! turn by command-line flags in the binary.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::game::execute::DEFAULT_ACTION_COOLDOWN_SECS;
use crate::network::topic::DeliveryPolicy;
use crate::network::worker::DEFAULT_QUEUE_CAPACITY;

/// Default listen address.
pub const DEFAULT_BIND: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
    8080,
);

/// Default world file.
pub const DEFAULT_WORLD_PATH: &str = "game.save";

/// Default inactivity window for a connection.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held an unusable value.
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        /// Variable name.
        key: &'static str,
        /// Raw value.
        value: String,
        /// What was wrong with it.
        reason: String,
    },
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Listen address.
    pub bind_addr: SocketAddr,
    /// World document loaded at startup.
    pub world_path: PathBuf,
    /// Rolling inactivity window for reads, writes and subscriber waits.
    pub idle_timeout: Duration,
    /// How responses reach subscribers.
    pub delivery: DeliveryPolicy,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Timer delay applied by Open and Close, in seconds.
    pub action_cooldown_secs: u64,
    /// Dice seed; wall clock when unset.
    pub seed: Option<u64>,
    /// Inbound request queue length.
    pub queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND,
            world_path: PathBuf::from(DEFAULT_WORLD_PATH),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            delivery: DeliveryPolicy::Synchronous,
            max_connections: 1000,
            action_cooldown_secs: DEFAULT_ACTION_COOLDOWN_SECS,
            seed: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

fn parse<T>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
        value,
    })
}

impl ServerConfig {
    /// Defaults overlaid by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Overlay values found by `lookup` onto `self`.
    pub fn overlay<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("GRIDHOLD_BIND") {
            self.bind_addr = parse("GRIDHOLD_BIND", v)?;
        }
        if let Some(v) = lookup("GRIDHOLD_WORLD") {
            self.world_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("GRIDHOLD_IDLE_TIMEOUT_SECS") {
            self.idle_timeout = Duration::from_secs(parse("GRIDHOLD_IDLE_TIMEOUT_SECS", v)?);
        }
        if let Some(v) = lookup("GRIDHOLD_DELIVERY") {
            self.delivery = parse("GRIDHOLD_DELIVERY", v)?;
        }
        if let Some(v) = lookup("GRIDHOLD_MAX_CONNECTIONS") {
            self.max_connections = parse("GRIDHOLD_MAX_CONNECTIONS", v)?;
        }
        if let Some(v) = lookup("GRIDHOLD_ACTION_COOLDOWN_SECS") {
            self.action_cooldown_secs = parse("GRIDHOLD_ACTION_COOLDOWN_SECS", v)?;
        }
        if let Some(v) = lookup("GRIDHOLD_SEED") {
            self.seed = Some(parse("GRIDHOLD_SEED", v)?);
        }
        Ok(self)
    }
}
