//! CommandComplete (B) message.

use crate::net::c_string_buf;

use super::code;
use super::prelude::*;

#[derive(Debug, Clone, PartialEq)]
pub struct CommandComplete {
    /// Command tag, e.g. `SELECT 1`.
    pub command: String,
}

impl CommandComplete {
    pub fn new(command: impl ToString) -> Self {
        Self {
            command: command.to_string(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

impl FromBytes for CommandComplete {
    fn from_bytes(mut bytes: Bytes) -> Result<Self, Error> {
        code!(bytes, 'C');
        let _len = bytes.get_i32();
        let command = c_string_buf(&mut bytes);

        Ok(Self { command })
    }
}

impl ToBytes for CommandComplete {
    fn to_bytes(&self) -> Result<Bytes, Error> {
        let mut payload = Payload::named(self.code());
        payload.put_string(&self.command);

        Ok(payload.freeze())
    }
}

impl Protocol for CommandComplete {
    fn code(&self) -> char {
        'C'
    }
}
