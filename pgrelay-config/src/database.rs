use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::pooling::PoolerMode;
use super::roles::Role;
use super::users::User;

/// A logical database clients connect to.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct Pool {
    /// Overrides `general.pool_mode`.
    pub pool_mode: Option<PoolerMode>,
    /// Infer the server role from the query text. When disabled,
    /// every query goes to the primary.
    #[serde(default = "Pool::enabled")]
    pub query_parser_enabled: bool,
    /// Send reads to the primary when the shard has no replicas.
    #[serde(default = "Pool::enabled")]
    pub primary_reads_enabled: bool,
    /// Function mapping a sharding key to a shard number.
    #[serde(default = "Pool::sharding_function")]
    pub sharding_function: String,
    /// Shards, in order.
    #[serde(default)]
    pub shards: Vec<Shard>,
    /// Users allowed to connect, keyed by name.
    #[serde(default)]
    pub users: BTreeMap<String, User>,
}

impl Pool {
    fn enabled() -> bool {
        true
    }

    fn sharding_function() -> String {
        "hash".into()
    }

    /// Pooler mode, falling back to the global default.
    pub fn pool_mode(&self, default: PoolerMode) -> PoolerMode {
        self.pool_mode.unwrap_or(default)
    }
}

/// One partition of the data.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct Shard {
    /// Database name on the servers.
    pub database: String,
    /// One primary and any number of replicas.
    #[serde(default)]
    pub servers: Vec<Server>,
}

impl Shard {
    pub fn primary(&self) -> Option<&Server> {
        self.servers.iter().find(|s| s.role == Role::Primary)
    }

    pub fn replicas(&self) -> impl Iterator<Item = &Server> {
        self.servers.iter().filter(|s| s.role == Role::Replica)
    }
}

/// PostgreSQL server.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct Server {
    pub host: String,
    #[serde(default = "Server::port")]
    pub port: u16,
    #[serde(default)]
    pub role: Role,
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl Server {
    fn port() -> u16 {
        5432
    }
}
