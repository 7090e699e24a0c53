//! Flush (F).

use super::code;
use super::prelude::*;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Flush;

impl FromBytes for Flush {
    fn from_bytes(mut bytes: Bytes) -> Result<Self, Error> {
        code!(bytes, 'H');
        let _len = bytes.get_i32();

        Ok(Flush)
    }
}

impl ToBytes for Flush {
    fn to_bytes(&self) -> Result<Bytes, Error> {
        Ok(Payload::named(self.code()).freeze())
    }
}

impl Protocol for Flush {
    fn code(&self) -> char {
        'H'
    }
}
