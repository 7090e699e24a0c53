//! BackendKeyData (B) message.

use std::fmt::Display;

use crate::net::messages::{code, prelude::*};
use rand::Rng;

/// BackendKeyData (B). Identifies a session for cancellation.
///
/// Clients receive one generated by the pooler; the one sent by each
/// server is kept to forward cancel requests.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, Default)]
pub struct BackendKeyData {
    /// Process ID.
    pub pid: i32,
    /// Process secret.
    pub secret: i32,
}

impl Display for BackendKeyData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pid={}", self.pid)
    }
}

impl BackendKeyData {
    /// Random process id and secret.
    pub fn new() -> Self {
        let mut rng = rand::rng();
        Self {
            pid: rng.random_range(1..i32::MAX),
            secret: rng.random(),
        }
    }
}

impl ToBytes for BackendKeyData {
    fn to_bytes(&self) -> Result<Bytes, Error> {
        let mut payload = Payload::named(self.code());

        payload.put_i32(self.pid);
        payload.put_i32(self.secret);

        Ok(payload.freeze())
    }
}

impl FromBytes for BackendKeyData {
    fn from_bytes(mut bytes: Bytes) -> Result<Self, Error> {
        code!(bytes, 'K');

        let _len = bytes.get_i32();

        Ok(Self {
            pid: bytes.get_i32(),
            secret: bytes.get_i32(),
        })
    }
}

impl Protocol for BackendKeyData {
    fn code(&self) -> char {
        'K'
    }
}
