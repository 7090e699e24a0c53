//! Execute (F) message.

use crate::net::c_string_buf;

use super::code;
use super::prelude::*;

#[derive(Debug, Clone, PartialEq)]
pub struct Execute {
    pub portal: String,
    /// Zero means no limit.
    pub max_rows: i32,
}

impl Default for Execute {
    fn default() -> Self {
        Self::new("")
    }
}

impl Execute {
    pub fn new(portal: &str) -> Self {
        Self {
            portal: portal.into(),
            max_rows: 0,
        }
    }
}

impl Protocol for Execute {
    fn code(&self) -> char {
        'E'
    }
}

impl FromBytes for Execute {
    fn from_bytes(mut bytes: Bytes) -> Result<Self, Error> {
        code!(bytes, 'E');
        let _len = bytes.get_i32();
        let portal = c_string_buf(&mut bytes);
        let max_rows = bytes.get_i32();

        Ok(Self { portal, max_rows })
    }
}

impl ToBytes for Execute {
    fn to_bytes(&self) -> Result<Bytes, Error> {
        let mut payload = Payload::named(self.code());
        payload.put_string(&self.portal);
        payload.put_i32(self.max_rows);
        Ok(payload.freeze())
    }
}
