//! Router errors.

use thiserror::Error;

use crate::net::messages::ErrorResponse;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid value for \"{setting}\": \"{value}\"")]
    InvalidValue {
        setting: &'static str,
        value: String,
    },

    #[error("{0}")]
    Net(#[from] crate::net::Error),
}

impl Error {
    /// Error sent to the client.
    pub fn to_error_response(&self) -> ErrorResponse {
        match self {
            Self::InvalidValue { .. } => ErrorResponse {
                code: "22023".into(),
                message: self.to_string(),
                ..Default::default()
            },
            Self::Net(err) => ErrorResponse::from_err(err),
        }
    }
}
