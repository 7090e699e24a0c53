use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs::read_to_string;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::database::Pool;
use super::error::Error;
use super::general::General;

/// Prefix marking a value that should be read from the environment.
const ENV_PREFIX: &str = "ENV$";

/// Sharding functions the pooler implements.
pub const SHARDING_FUNCTIONS: &[&str] = &["hash", "modulo"];

/// Configuration file contents.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub general: General,
    /// Pools, keyed by the database name clients use.
    #[serde(default)]
    pub pools: BTreeMap<String, Pool>,
}

/// Loaded configuration and where it came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigAndPath {
    pub config: Config,
    pub path: PathBuf,
}

impl ConfigAndPath {
    /// Load configuration from disk or use defaults.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let config = if let Ok(source) = read_to_string(path) {
            let config = Config::from_toml(&source)?;
            info!("loaded \"{}\"", path.display());
            config
        } else {
            warn!(
                "\"{}\" doesn't exist, loading defaults instead",
                path.display()
            );
            Config::default()
        };

        Ok(Self {
            config,
            path: path.to_owned(),
        })
    }
}

impl Config {
    /// Parse, resolve `ENV$` values and validate.
    pub fn from_toml(source: &str) -> Result<Self, Error> {
        let mut config: Config = match toml::from_str(source) {
            Ok(config) => config,
            Err(err) => return Err(Error::config(source, err)),
        };
        config.resolve_env();
        config.check()?;

        Ok(config)
    }

    /// Replace `ENV$NAME` values with the contents of `$NAME`.
    fn resolve_env(&mut self) {
        for pool in self.pools.values_mut() {
            for shard in &mut pool.shards {
                for server in &mut shard.servers {
                    resolve(&mut server.host);
                    resolve(&mut server.username);
                    resolve(&mut server.password);
                }
            }

            for user in pool.users.values_mut() {
                resolve(&mut user.password);
            }
        }
    }

    /// Validate the configuration.
    pub fn check(&self) -> Result<(), Error> {
        for (name, pool) in &self.pools {
            if pool.shards.is_empty() {
                return Err(Error::invalid(format!("pool \"{}\" has no shards", name)));
            }

            if !SHARDING_FUNCTIONS.contains(&pool.sharding_function.as_str()) {
                return Err(Error::invalid(format!(
                    "pool \"{}\" uses unknown sharding function \"{}\", expected one of: {}",
                    name,
                    pool.sharding_function,
                    SHARDING_FUNCTIONS.join(", ")
                )));
            }

            if pool.users.is_empty() {
                warn!("pool \"{}\" has no users, nobody can connect to it", name);
            }

            for (number, shard) in pool.shards.iter().enumerate() {
                let primaries = shard.servers.iter().filter(|s| s.role.is_primary()).count();
                if primaries != 1 {
                    return Err(Error::invalid(format!(
                        "shard {} of pool \"{}\" has {} primaries, expected exactly one",
                        number, name, primaries
                    )));
                }
            }
        }

        Ok(())
    }

    /// Get pool by the database name clients use.
    pub fn pool(&self, database: &str) -> Option<&Pool> {
        self.pools.get(database)
    }
}

fn resolve(value: &mut String) {
    if let Some(name) = value.strip_prefix(ENV_PREFIX) {
        match env::var(name) {
            Ok(var) => *value = var,
            Err(_) => {
                warn!("environment variable \"{}\" is not set", name);
                value.clear();
            }
        }
    }
}
