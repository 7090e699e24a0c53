//! Backend errors.

use std::time::Duration;

use thiserror::Error;

use crate::config::Role;
use crate::net::messages::ErrorResponse;

/// Backend error.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("net: {0}")]
    Net(#[from] crate::net::Error),

    #[error("{0}")]
    Auth(#[from] crate::auth::Error),

    #[error("{0}")]
    Pool(#[from] super::pool::Error),

    #[error("config: {0}")]
    Config(#[from] crate::config::Error),

    /// The server refused the connection during startup.
    #[error("{0}")]
    ConnectionError(Box<ErrorResponse>),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("unexpected message: {0}")]
    UnexpectedMessage(char),

    #[error("server did not send BackendKeyData")]
    NoBackendKeyData,

    #[error("user is not allowed to use the {0}")]
    PermissionDenied(Role),

    #[error("no {role} available for shard {shard}")]
    NoAvailableServer { shard: usize, role: Role },

    #[error("server connection is already bound to client {0}")]
    AlreadyBound(crate::net::BackendKeyData),

    #[error("statement timeout of {0:?} expired")]
    Timeout(Duration),

    #[error("canceled: {0}")]
    Canceled(String),

    #[error("server connection is closed")]
    Closed,
}

impl Error {
    /// The client went away or broke the exchange while we were relaying.
    pub fn canceled(err: impl std::fmt::Display) -> Self {
        Self::Canceled(err.to_string())
    }

    /// The server connection can't be reused after this error.
    pub fn evicts(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::Net(_)
                | Self::Auth(_)
                | Self::ConnectionError(_)
                | Self::UnexpectedMessage(_)
                | Self::NoBackendKeyData
                | Self::Closed
        )
    }

    /// The client session can't continue after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::ConnectionError(_))
    }

    /// Error sent to the client.
    pub fn to_error_response(&self) -> ErrorResponse {
        match self {
            Self::ProtocolViolation(_) | Self::UnexpectedMessage(_) => {
                ErrorResponse::protocol_violation(self)
            }
            Self::PermissionDenied(_) => ErrorResponse::permission_denied(self),
            Self::NoAvailableServer { .. } | Self::Pool(_) => ErrorResponse::no_server(self),
            Self::Timeout(duration) => ErrorResponse::timeout(Some(*duration)),
            Self::Canceled(_) => ErrorResponse::canceled(self),
            Self::ConnectionError(error) => {
                let mut error = error.as_ref().clone();
                error.severity = "FATAL".into();
                error
            }
            Self::Auth(_) => ErrorResponse {
                severity: "FATAL".into(),
                code: "28P01".into(),
                message: self.to_string(),
                ..Default::default()
            },
            _ => ErrorResponse::from_err(self),
        }
    }
}
