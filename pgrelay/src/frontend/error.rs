//! Frontend errors.

use std::io::ErrorKind;

use thiserror::Error;

/// Frontend error.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("net: {0}")]
    Net(#[from] crate::net::Error),

    #[error("{0}")]
    Backend(#[from] crate::backend::Error),

    #[error("{0}")]
    Router(#[from] super::router::Error),

    #[error("{0}")]
    Config(#[from] crate::config::Error),
}

impl Error {
    /// The client hung up.
    pub(crate) fn disconnect(&self) -> bool {
        match self {
            Error::Net(crate::net::Error::Disconnected | crate::net::Error::UnexpectedEof) => true,
            Error::Net(crate::net::Error::Io(err)) | Error::Io(err) => matches!(
                err.kind(),
                ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}
