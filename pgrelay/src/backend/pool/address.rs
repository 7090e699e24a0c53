//! Server address.

use std::fmt::Display;

use crate::config::{Server as ServerConfig, ShardConfig};

/// Server address.
#[derive(Debug, Clone, PartialEq, Default, Eq, Hash)]
pub struct Address {
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// PostgreSQL database name.
    pub database_name: String,
    /// Username.
    pub user: String,
    /// Password.
    pub password: String,
}

impl Address {
    /// Create new address from config values.
    pub fn new(shard: &ShardConfig, server: &ServerConfig) -> Self {
        Address {
            host: server.host.clone(),
            port: server.port,
            database_name: shard.database.clone(),
            user: server.username.clone(),
            password: server.password.clone(),
        }
    }

    /// `host:port`, for connecting.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@{}:{}/{}",
            self.user, self.host, self.port, self.database_name
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Role;

    #[test]
    fn test_address_from_config() {
        let shard = ShardConfig {
            database: "app".into(),
            servers: vec![],
        };
        let server = ServerConfig {
            host: "10.0.0.1".into(),
            port: 6432,
            role: Role::Replica,
            username: "app_user".into(),
            password: "secret".into(),
        };

        let addr = Address::new(&shard, &server);
        assert_eq!(addr.addr(), "10.0.0.1:6432");
        assert_eq!(addr.to_string(), "app_user@10.0.0.1:6432/app");
    }
}
