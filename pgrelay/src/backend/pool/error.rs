//! Connection pool errors.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone, Copy)]
pub enum Error {
    #[error("pool is offline")]
    Offline,

    #[error("connect timeout")]
    ConnectTimeout,

    #[error("shard {0} has no primary")]
    NoPrimary(usize),
}
