//! Authentication messages.

use super::{code, prelude::*};

pub mod password;
pub use password::Password;

/// Authentication (B) messages.
#[derive(Debug, Clone, PartialEq)]
pub enum Authentication {
    /// AuthenticationOk (B)
    Ok,
    /// AuthenticationCleartextPassword (B).
    ClearTextPassword,
    /// AuthenticationMD5Password (B), carrying the 4-byte salt.
    Md5(Bytes),
    /// AuthenticationSASL (B), carrying the offered mechanisms.
    Sasl(Vec<String>),
    /// AuthenticationSASLContinue (B)
    SaslContinue(String),
    /// AuthenticationSASLFinal (B)
    SaslFinal(String),
}

impl Authentication {
    /// Ask the client for an MD5-hashed password.
    pub fn md5(salt: [u8; 4]) -> Self {
        Authentication::Md5(Bytes::copy_from_slice(&salt))
    }
}

impl FromBytes for Authentication {
    fn from_bytes(mut bytes: Bytes) -> Result<Self, Error> {
        code!(bytes, 'R');

        let _len = bytes.get_i32();
        let status = bytes.get_i32();

        match status {
            0 => Ok(Authentication::Ok),
            3 => Ok(Authentication::ClearTextPassword),
            5 => {
                if bytes.remaining() < 4 {
                    return Err(Error::Truncated);
                }
                Ok(Authentication::Md5(bytes.split_to(4)))
            }
            10 => {
                let mechanisms = bytes
                    .split(|b| *b == 0)
                    .filter(|m| !m.is_empty())
                    .map(|m| String::from_utf8_lossy(m).to_string())
                    .collect();
                Ok(Authentication::Sasl(mechanisms))
            }
            11 => Ok(Authentication::SaslContinue(
                String::from_utf8_lossy(&bytes).to_string(),
            )),
            12 => Ok(Authentication::SaslFinal(
                String::from_utf8_lossy(&bytes).to_string(),
            )),
            status => Err(Error::UnsupportedAuthentication(status)),
        }
    }
}

impl Protocol for Authentication {
    fn code(&self) -> char {
        'R'
    }
}

impl ToBytes for Authentication {
    fn to_bytes(&self) -> Result<Bytes, Error> {
        let mut payload = Payload::named(self.code());

        match self {
            Authentication::Ok => payload.put_i32(0),

            Authentication::ClearTextPassword => payload.put_i32(3),

            Authentication::Md5(salt) => {
                payload.put_i32(5);
                payload.put(salt.clone());
            }

            Authentication::Sasl(mechanisms) => {
                payload.put_i32(10);
                for mechanism in mechanisms {
                    payload.put_string(mechanism);
                }
                payload.put_u8(0);
            }

            Authentication::SaslContinue(data) => {
                payload.put_i32(11);
                payload.put_slice(data.as_bytes());
            }

            Authentication::SaslFinal(data) => {
                payload.put_i32(12);
                payload.put_slice(data.as_bytes());
            }
        }

        Ok(payload.freeze())
    }
}
