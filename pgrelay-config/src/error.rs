//! Configuration errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Deserialize(#[from] toml::de::Error),

    #[error("config error on line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("\"{0}\" doesn't exist")]
    NotFound(String),
}

impl Error {
    /// Build a syntax error pointing at the line in the source file.
    pub fn config(source: &str, err: toml::de::Error) -> Self {
        let line = err
            .span()
            .map(|span| source[..span.start.min(source.len())].matches('\n').count() + 1)
            .unwrap_or(0);

        Self::Syntax {
            line,
            message: err.message().to_string(),
        }
    }

    pub fn invalid(message: impl ToString) -> Self {
        Self::Invalid(message.to_string())
    }
}
