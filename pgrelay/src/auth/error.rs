use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("incorrect salt size")]
    IncorrectSaltSize(#[from] std::array::TryFromSliceError),

    #[error("scram: {0}")]
    Scram(#[from] scram::Error),

    #[error("SASL messages out of order")]
    OutOfOrder,

    #[error("server accepted the login without proving it knows the password")]
    Unverified,

    #[error("server doesn't offer SCRAM-SHA-256, offered: {0:?}")]
    UnsupportedMechanism(Vec<String>),
}
