//! A shard: one primary and its replicas.

use rand::Rng;
use tracing::debug;

use crate::backend;
use crate::config::{Role, ShardConfig};
use crate::net::Parameter;

use super::{Address, Config, Error, Guard, Pool};

/// Connection pools for the servers of one shard.
#[derive(Clone, Debug)]
pub struct Shard {
    number: usize,
    config: ShardConfig,
    primary: Pool,
    replicas: Vec<Pool>,
}

impl Shard {
    /// Create pools for all servers in the shard. Connections are
    /// opened on first use.
    pub fn new(
        number: usize,
        config: &ShardConfig,
        pool: Config,
        params: Vec<Parameter>,
    ) -> Result<Self, Error> {
        let primary = config.primary().ok_or(Error::NoPrimary(number))?;
        let primary = Pool::new(Address::new(config, primary), pool, params.clone());
        let replicas = config
            .replicas()
            .map(|replica| Pool::new(Address::new(config, replica), pool, params.clone()))
            .collect();

        Ok(Self {
            number,
            config: config.clone(),
            primary,
            replicas,
        })
    }

    /// Get a connection to a server with this role.
    ///
    /// Replica reads go to a random replica. Without replicas, they go
    /// to the primary if `primary_reads` is on, otherwise there is no server.
    pub async fn choose(
        &self,
        role: Role,
        primary_reads: bool,
    ) -> Result<Option<Guard>, backend::Error> {
        let pool = match role {
            Role::Primary => &self.primary,
            Role::Replica if self.replicas.is_empty() => {
                if primary_reads {
                    debug!("no replicas in shard {}, reading from primary", self.number);
                    &self.primary
                } else {
                    return Ok(None);
                }
            }
            Role::Replica => {
                let replica = rand::rng().random_range(0..self.replicas.len());
                &self.replicas[replica]
            }
        };

        Ok(Some(pool.get().await?))
    }

    /// The shard is running with this configuration.
    pub fn matches(&self, config: &ShardConfig) -> bool {
        &self.config == config
    }

    pub fn number(&self) -> usize {
        self.number
    }

    pub fn primary(&self) -> &Pool {
        &self.primary
    }

    pub fn replicas(&self) -> &[Pool] {
        &self.replicas
    }

    /// Close all pools.
    pub fn shutdown(&self) {
        self.primary.shutdown();
        for replica in &self.replicas {
            replica.shutdown();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::pool::test::mock::MockServer;
    use crate::backend::pool::test::shard_config;

    #[tokio::test]
    async fn test_replica_fallback() {
        let primary = MockServer::start().await;
        let config = shard_config(&primary, &[]);

        let shard = Shard::new(0, &config, Config::default(), vec![]).unwrap();
        assert!(shard.choose(Role::Replica, false).await.unwrap().is_none());

        let guard = shard.choose(Role::Replica, true).await.unwrap().unwrap();
        assert_eq!(guard.addr(), shard.primary().addr());
    }

    #[tokio::test]
    async fn test_replica_reads() {
        let primary = MockServer::start().await;
        let replica = MockServer::start().await;
        let config = shard_config(&primary, &[&replica]);

        let shard = Shard::new(0, &config, Config::default(), vec![]).unwrap();

        for _ in 0..5 {
            let guard = shard.choose(Role::Replica, true).await.unwrap().unwrap();
            assert_eq!(guard.addr(), &replica.address());
        }

        let guard = shard.choose(Role::Primary, false).await.unwrap().unwrap();
        assert_eq!(guard.addr(), &primary.address());
    }

    #[test]
    fn test_no_primary() {
        let config = ShardConfig {
            database: "db".into(),
            servers: vec![],
        };
        let err = Shard::new(3, &config, Config::default(), vec![]).unwrap_err();
        assert_eq!(err, Error::NoPrimary(3));
    }

    #[tokio::test]
    async fn test_matches() {
        let primary = MockServer::start().await;
        let config = shard_config(&primary, &[]);
        let shard = Shard::new(0, &config, Config::default(), vec![]).unwrap();

        assert!(shard.matches(&config));
        let mut changed = config.clone();
        changed.database = "other".into();
        assert!(!shard.matches(&changed));
    }
}
