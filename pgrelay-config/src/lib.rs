//! Configuration file for pgrelay.

pub mod core;
pub mod database;
pub mod error;
pub mod general;
pub mod pooling;
pub mod roles;
pub mod users;

pub use core::{Config, ConfigAndPath};
pub use database::{Pool, Server, Shard};
pub use error::Error;
pub use general::General;
pub use pooling::PoolerMode;
pub use roles::{Role, UserRole};
pub use users::User;
