//! Close (F) message.

use crate::net::c_string_buf;

use super::code;
use super::prelude::*;

#[derive(Debug, Clone, PartialEq)]
pub struct Close {
    /// 'S' for a prepared statement, 'P' for a portal.
    pub kind: char,
    pub name: String,
}

impl Close {
    pub fn named(name: &str) -> Self {
        Self {
            kind: 'S',
            name: name.into(),
        }
    }

    pub fn portal(name: &str) -> Self {
        Self {
            kind: 'P',
            name: name.into(),
        }
    }

    pub fn is_statement(&self) -> bool {
        self.kind == 'S'
    }

    pub fn is_portal(&self) -> bool {
        self.kind == 'P'
    }
}

impl FromBytes for Close {
    fn from_bytes(mut bytes: Bytes) -> Result<Self, Error> {
        code!(bytes, 'C');
        let _len = bytes.get_i32();
        if !bytes.has_remaining() {
            return Err(Error::Truncated);
        }
        let kind = bytes.get_u8() as char;
        let name = c_string_buf(&mut bytes);

        Ok(Self { kind, name })
    }
}

impl ToBytes for Close {
    fn to_bytes(&self) -> Result<Bytes, Error> {
        let mut payload = Payload::named(self.code());
        payload.put_u8(self.kind as u8);
        payload.put_string(&self.name);

        Ok(payload.freeze())
    }
}

impl Protocol for Close {
    fn code(&self) -> char {
        'C'
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_truncated() {
        let bytes = Bytes::from_static(b"C\x00\x00\x00\x04");
        assert!(matches!(Close::from_bytes(bytes), Err(Error::Truncated)));

        let message = Close::portal("p1");
        let decoded = Close::from_bytes(message.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, message);
    }
}
