//! CloseComplete (B).

use super::code;
use super::prelude::*;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CloseComplete;

impl FromBytes for CloseComplete {
    fn from_bytes(mut bytes: Bytes) -> Result<Self, Error> {
        code!(bytes, '3');
        let _len = bytes.get_i32();

        Ok(CloseComplete)
    }
}

impl ToBytes for CloseComplete {
    fn to_bytes(&self) -> Result<Bytes, Error> {
        Ok(Payload::named(self.code()).freeze())
    }
}

impl Protocol for CloseComplete {
    fn code(&self) -> char {
        '3'
    }
}
