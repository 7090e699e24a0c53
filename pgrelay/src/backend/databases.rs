//! Databases behind pgrelay.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;

use arc_swap::ArcSwap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::{self, Config};

use super::pooler::{new_pooler, Pooler, Settings};
use super::Error;

static DATABASES: Lazy<ArcSwap<Databases>> =
    Lazy::new(|| ArcSwap::from_pointee(Databases::default()));
static LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Get databases handle.
pub fn databases() -> Arc<Databases> {
    DATABASES.load().clone()
}

/// Create poolers from the current configuration.
pub fn init() -> Result<(), Error> {
    let _lock = LOCK.lock();
    let config = config::config();
    let databases = Databases::from_config(&config.config, &databases())?;
    replace(databases);

    Ok(())
}

/// Re-read the configuration file and apply it to running poolers.
pub fn reload() -> Result<(), Error> {
    let _lock = LOCK.lock();
    let config = config::reload()?;
    let databases = Databases::from_config(&config.config, &databases())?;
    replace(databases);

    Ok(())
}

/// Close all server connections.
pub fn shutdown() {
    databases().shutdown();
}

/// Swap in new databases and shut down poolers nobody uses anymore.
fn replace(new: Databases) {
    let new = Arc::new(new);
    let old = DATABASES.swap(new.clone());

    for (user, pooler) in &old.poolers {
        let kept = new
            .poolers
            .get(user)
            .is_some_and(|next| Arc::ptr_eq(next, pooler));

        if !kept {
            debug!("pool for {} removed", user);
            pooler.shutdown();
        }
    }

    info!("serving {} pools", new.len());
}

/// Database and user a client connects with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct User {
    /// User name.
    pub user: String,
    /// Database name.
    pub database: String,
}

impl User {
    pub fn new(user: &str, database: &str) -> Self {
        Self {
            user: user.to_owned(),
            database: database.to_owned(),
        }
    }
}

impl Display for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.user, self.database)
    }
}

/// Poolers, one per database and user.
#[derive(Default, Debug)]
pub struct Databases {
    poolers: HashMap<User, Arc<dyn Pooler>>,
}

impl Databases {
    /// Build poolers for the configuration.
    ///
    /// Poolers from `previous` are reused when their settings didn't change,
    /// or reconfigured in place when the change doesn't need a new pooler.
    pub fn from_config(config: &Config, previous: &Databases) -> Result<Self, Error> {
        let mut poolers = HashMap::new();

        for (database, pool) in &config.pools {
            for (user_name, user) in &pool.users {
                let key = User::new(user_name, database);
                let settings = Settings::new(database, user_name, user, pool, &config.general);

                let pooler = match previous.poolers.get(&key) {
                    Some(pooler) if *pooler.settings() == settings => pooler.clone(),
                    Some(pooler) if !pooler.settings().needs_restart(&settings) => {
                        info!("reconfiguring pool for {}", key);
                        pooler.reconfigure(settings);
                        pooler.clone()
                    }
                    _ => {
                        debug!("creating {:?} pool for {}", settings.mode, key);
                        new_pooler(settings)?
                    }
                };

                poolers.insert(key, pooler);
            }
        }

        Ok(Self { poolers })
    }

    /// Pooler for the user and database.
    pub fn get(&self, user: &str, database: &str) -> Option<Arc<dyn Pooler>> {
        self.poolers.get(&User::new(user, database)).cloned()
    }

    /// Any user is configured for this database.
    pub fn exists(&self, database: &str) -> bool {
        self.poolers.keys().any(|user| user.database == database)
    }

    pub fn len(&self) -> usize {
        self.poolers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poolers.is_empty()
    }

    /// Close all server connections.
    pub fn shutdown(&self) {
        for pooler in self.poolers.values() {
            pooler.shutdown();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::PoolerMode;

    fn config(pool_size: usize, host: &str, users: &[&str]) -> Config {
        let mut source = format!(
            r#"
[general]
pool_size = {}

[pools.app]

[[pools.app.shards]]
database = "app"

[[pools.app.shards.servers]]
host = "{}"
username = "postgres"

[pools.sessions]
pool_mode = "session"

[[pools.sessions.shards]]
database = "sessions"

[[pools.sessions.shards.servers]]
host = "{}"
username = "postgres"

[pools.sessions.users.alice]
password = "secret"
"#,
            pool_size, host, host
        );

        for user in users {
            source.push_str(&format!("\n[pools.app.users.{}]\npassword = \"secret\"\n", user));
        }

        Config::from_toml(&source).unwrap()
    }

    #[test]
    fn test_from_config() {
        let databases =
            Databases::from_config(&config(5, "127.0.0.1", &["alice", "bob"]), &Databases::default())
                .unwrap();

        assert_eq!(databases.len(), 3);
        assert!(databases.exists("app"));
        assert!(databases.exists("sessions"));
        assert!(!databases.exists("other"));
        assert!(databases.get("carol", "app").is_none());

        let alice = databases.get("alice", "app").unwrap();
        assert_eq!(alice.settings().mode, PoolerMode::Transaction);
        assert_eq!(alice.settings().pool_size, 5);

        let sessions = databases.get("alice", "sessions").unwrap();
        assert_eq!(sessions.settings().mode, PoolerMode::Session);
    }

    #[test]
    fn test_reuse_and_reconfigure() {
        let first = Databases::from_config(&config(5, "127.0.0.1", &["alice"]), &Databases::default())
            .unwrap();
        let alice = first.get("alice", "app").unwrap();

        // Nothing changed.
        let second = Databases::from_config(&config(5, "127.0.0.1", &["alice", "bob"]), &first).unwrap();
        assert!(Arc::ptr_eq(&alice, &second.get("alice", "app").unwrap()));
        assert!(second.get("bob", "app").is_some());

        // Server moved: same pooler, new settings.
        let third = Databases::from_config(&config(5, "127.0.0.2", &["alice"]), &second).unwrap();
        let moved = third.get("alice", "app").unwrap();
        assert!(Arc::ptr_eq(&alice, &moved));
        assert_eq!(moved.settings().shards[0].servers[0].host, "127.0.0.2");
        assert!(third.get("bob", "app").is_none());

        // Pool size changed: new pooler.
        let fourth = Databases::from_config(&config(7, "127.0.0.2", &["alice"]), &third).unwrap();
        let resized = fourth.get("alice", "app").unwrap();
        assert!(!Arc::ptr_eq(&alice, &resized));
        assert_eq!(resized.settings().pool_size, 7);
    }
}
