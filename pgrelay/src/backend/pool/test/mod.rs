//! Pool test helpers.

use std::time::Duration;

use crate::config::{Role, Server as ServerConfig, ShardConfig};

use super::{Config, Pool};

pub mod mock;

use mock::MockServer;

/// Pool of `max` connections to the mock server, with short timeouts.
pub fn pool(mock: &MockServer, max: usize) -> Pool {
    Pool::new(mock.address(), config(max), vec![])
}

pub fn config(max: usize) -> Config {
    Config {
        max,
        connect_timeout: Duration::from_secs(1),
        healthcheck_timeout: Duration::from_millis(500),
        stabilize_timeout: Duration::from_millis(100),
        copy_timeout: Duration::from_millis(500),
        ..Default::default()
    }
}

/// Shard config with one primary and some replicas.
pub fn shard_config(primary: &MockServer, replicas: &[&MockServer]) -> ShardConfig {
    let server = |mock: &MockServer, role: Role| {
        let addr = mock.address();
        ServerConfig {
            host: addr.host,
            port: addr.port,
            role,
            username: addr.user,
            password: addr.password,
        }
    };

    let mut servers = vec![server(primary, Role::Primary)];
    servers.extend(replicas.iter().map(|mock| server(mock, Role::Replica)));

    ShardConfig {
        database: mock::DATABASE.into(),
        servers,
    }
}
