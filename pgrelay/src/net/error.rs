//! Frontend/backend protocol errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected EOF")]
    UnexpectedEof,

    #[error("unexpected payload, expected \"{expected}\", got \"{got}\"")]
    UnexpectedPayload { expected: char, got: char },

    #[error("message too short")]
    Truncated,

    #[error("unknown transaction state identifier: {0}")]
    UnknownTransactionStateIdentifier(char),

    #[error("unsupported authentication: {0}")]
    UnsupportedAuthentication(i32),

    #[error("unsupported startup request: {0}")]
    UnsupportedStartup(i32),

    #[error("describe target must be 'S' or 'P', got '{0}'")]
    UnknownDescribeTarget(char),

    #[error("{0}")]
    Tls(#[from] tokio_rustls::rustls::Error),

    #[error("{0}")]
    Pem(#[from] tokio_rustls::rustls::pki_types::pem::Error),

    #[error("\"{0}\" parameter is missing")]
    MissingParameter(String),

    #[error("client is gone")]
    Disconnected,
}
