//! Manage connections to the servers.

pub mod address;
pub mod config;
pub mod error;
pub mod guard;
pub mod pool_impl;
pub mod shard;

pub use address::Address;
pub use config::Config;
pub use error::Error;
pub use guard::Guard;
pub use pool_impl::Pool;
pub use shard::Shard;

#[cfg(test)]
pub mod test;
