//! COPY sub-protocol messages.

use crate::net::c_string_buf;

use super::code;
use super::prelude::*;

/// CopyData (F & B).
#[derive(Debug, Clone, PartialEq)]
pub struct CopyData {
    data: Bytes,
}

impl CopyData {
    pub fn new(data: &[u8]) -> Self {
        Self {
            data: Bytes::copy_from_slice(data),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl FromBytes for CopyData {
    fn from_bytes(mut bytes: Bytes) -> Result<Self, Error> {
        code!(bytes, 'd');
        let _len = bytes.get_i32();

        Ok(Self { data: bytes })
    }
}

impl ToBytes for CopyData {
    fn to_bytes(&self) -> Result<Bytes, Error> {
        let mut payload = Payload::named(self.code());
        payload.put_slice(&self.data);

        Ok(payload.freeze())
    }
}

impl Protocol for CopyData {
    fn code(&self) -> char {
        'd'
    }
}

/// CopyDone (F & B).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CopyDone;

impl FromBytes for CopyDone {
    fn from_bytes(mut bytes: Bytes) -> Result<Self, Error> {
        code!(bytes, 'c');
        let _len = bytes.get_i32();

        Ok(CopyDone)
    }
}

impl ToBytes for CopyDone {
    fn to_bytes(&self) -> Result<Bytes, Error> {
        Ok(Payload::named(self.code()).freeze())
    }
}

impl Protocol for CopyDone {
    fn code(&self) -> char {
        'c'
    }
}

/// CopyFail (F).
#[derive(Debug, Clone, PartialEq)]
pub struct CopyFail {
    pub error: String,
}

impl CopyFail {
    pub fn new(error: impl ToString) -> Self {
        Self {
            error: error.to_string(),
        }
    }
}

impl FromBytes for CopyFail {
    fn from_bytes(mut bytes: Bytes) -> Result<Self, Error> {
        code!(bytes, 'f');
        let _len = bytes.get_i32();
        let error = c_string_buf(&mut bytes);

        Ok(Self { error })
    }
}

impl ToBytes for CopyFail {
    fn to_bytes(&self) -> Result<Bytes, Error> {
        let mut payload = Payload::named(self.code());
        payload.put_string(&self.error);

        Ok(payload.freeze())
    }
}

impl Protocol for CopyFail {
    fn code(&self) -> char {
        'f'
    }
}
