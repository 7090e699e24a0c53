//! Pool configuration.

use std::time::Duration;

use crate::config::General;

/// Settings for one server's connection pool.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    /// Maximum number of connections.
    pub max: usize,
    /// How long to wait for a new connection.
    pub connect_timeout: Duration,
    /// Check idle connections before handing them out.
    pub healthcheck: bool,
    /// How long a health check may take.
    pub healthcheck_timeout: Duration,
    /// How long a dirty connection has to recover before it's closed.
    pub stabilize_timeout: Duration,
    /// How long COPY waits for the client.
    pub copy_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max: 10,
            connect_timeout: Duration::from_secs(5),
            healthcheck: false,
            healthcheck_timeout: Duration::from_secs(5),
            stabilize_timeout: Duration::from_secs(5),
            copy_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Pool of `max` connections using the timeouts from the config file.
    pub fn new(general: &General, max: usize) -> Self {
        Self {
            max: max.max(1),
            connect_timeout: general.connect_timeout(),
            healthcheck: false,
            healthcheck_timeout: general.healthcheck_timeout(),
            stabilize_timeout: general.stabilize_timeout(),
            copy_timeout: general.copy_timeout(),
        }
    }

    /// Check idle connections before use.
    pub fn with_healthcheck(mut self) -> Self {
        self.healthcheck = true;
        self
    }
}
