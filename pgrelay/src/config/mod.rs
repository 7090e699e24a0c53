//! Configuration.

use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;
use once_cell::sync::Lazy;
use tracing::info;

pub use pgrelay_config::{
    Config, ConfigAndPath, Error, General, Pool as PoolConfig, PoolerMode, Role, Server,
    Shard as ShardConfig, User, UserRole,
};

static CONFIG: Lazy<ArcSwap<ConfigAndPath>> =
    Lazy::new(|| ArcSwap::from_pointee(ConfigAndPath::default()));

/// Current configuration snapshot.
pub fn config() -> Arc<ConfigAndPath> {
    CONFIG.load().clone()
}

/// Load the configuration file and make it current.
pub fn load(path: &Path) -> Result<Arc<ConfigAndPath>, Error> {
    let config = ConfigAndPath::load(path)?;
    set(config)
}

/// Replace the current configuration.
pub fn set(config: ConfigAndPath) -> Result<Arc<ConfigAndPath>, Error> {
    config.config.check()?;
    let config = Arc::new(config);
    CONFIG.store(config.clone());

    Ok(config)
}

/// Re-read the file the current configuration came from.
pub fn reload() -> Result<Arc<ConfigAndPath>, Error> {
    let path = config().path.clone();
    info!("reloading \"{}\"", path.display());
    load(&path)
}
