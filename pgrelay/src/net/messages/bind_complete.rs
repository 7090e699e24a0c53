//! BindComplete (B).

use super::code;
use super::prelude::*;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BindComplete;

impl FromBytes for BindComplete {
    fn from_bytes(mut bytes: Bytes) -> Result<Self, Error> {
        code!(bytes, '2');
        let _len = bytes.get_i32();

        Ok(BindComplete)
    }
}

impl ToBytes for BindComplete {
    fn to_bytes(&self) -> Result<Bytes, Error> {
        Ok(Payload::named(self.code()).freeze())
    }
}

impl Protocol for BindComplete {
    fn code(&self) -> char {
        '2'
    }
}
