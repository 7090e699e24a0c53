use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::pooling::PoolerMode;

/// Settings for the pooler process itself.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct General {
    /// Address to listen on.
    ///
    /// _Default:_ `0.0.0.0`
    #[serde(default = "General::host")]
    pub host: String,

    /// Port to listen on.
    ///
    /// _Default:_ `6432`
    #[serde(default = "General::port")]
    pub port: u16,

    /// Default number of server connections per user pool.
    ///
    /// _Default:_ `10`
    #[serde(default = "General::pool_size")]
    pub pool_size: usize,

    /// Default pooler mode, can be overridden per pool.
    #[serde(default)]
    pub pool_mode: PoolerMode,

    /// Maximum time to wait for a new server connection, in milliseconds.
    #[serde(default = "General::default_connect_timeout")]
    pub connect_timeout: u64,

    /// Maximum time a health check can take, in milliseconds.
    #[serde(default = "General::default_healthcheck_timeout")]
    pub healthcheck_timeout: u64,

    /// How long to wait for clients to disconnect on shutdown, in milliseconds.
    #[serde(default = "General::default_shutdown_timeout")]
    pub shutdown_timeout: u64,

    /// Maximum time spent returning a dirty connection to a clean state, in milliseconds.
    #[serde(default = "General::default_stabilize_timeout")]
    pub stabilize_timeout: u64,

    /// How long a client can stay silent during COPY, in milliseconds.
    #[serde(default = "General::default_copy_timeout")]
    pub copy_timeout: u64,

    /// TLS certificate served to clients.
    pub tls_certificate: Option<PathBuf>,

    /// TLS private key.
    pub tls_private_key: Option<PathBuf>,
}

impl Default for General {
    fn default() -> Self {
        Self {
            host: Self::host(),
            port: Self::port(),
            pool_size: Self::pool_size(),
            pool_mode: PoolerMode::default(),
            connect_timeout: Self::default_connect_timeout(),
            healthcheck_timeout: Self::default_healthcheck_timeout(),
            shutdown_timeout: Self::default_shutdown_timeout(),
            stabilize_timeout: Self::default_stabilize_timeout(),
            copy_timeout: Self::default_copy_timeout(),
            tls_certificate: None,
            tls_private_key: None,
        }
    }
}

impl General {
    fn host() -> String {
        "0.0.0.0".into()
    }

    fn port() -> u16 {
        6432
    }

    fn pool_size() -> usize {
        10
    }

    fn default_connect_timeout() -> u64 {
        5_000
    }

    fn default_healthcheck_timeout() -> u64 {
        5_000
    }

    fn default_shutdown_timeout() -> u64 {
        60_000
    }

    fn default_stabilize_timeout() -> u64 {
        5_000
    }

    fn default_copy_timeout() -> u64 {
        30_000
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout)
    }

    pub fn healthcheck_timeout(&self) -> Duration {
        Duration::from_millis(self.healthcheck_timeout)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout)
    }

    pub fn stabilize_timeout(&self) -> Duration {
        Duration::from_millis(self.stabilize_timeout)
    }

    pub fn copy_timeout(&self) -> Duration {
        Duration::from_millis(self.copy_timeout)
    }

    /// TLS certificate and key, if both are configured.
    pub fn tls(&self) -> Option<(&PathBuf, &PathBuf)> {
        match (&self.tls_certificate, &self.tls_private_key) {
            (Some(cert), Some(key)) => Some((cert, key)),
            _ => None,
        }
    }
}
