//! SCRAM-SHA-256 authentication.
pub mod client;

pub use super::Error;
pub use client::Client;

/// The only SASL mechanism we speak.
pub const MECHANISM: &str = "SCRAM-SHA-256";
