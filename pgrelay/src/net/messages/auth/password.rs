//! Password messages.

use crate::net::c_string_buf;

use super::super::code;
use super::super::prelude::*;

/// Password message.
#[derive(Debug, Clone, PartialEq)]
pub enum Password {
    /// SASLInitialResponse (F)
    SASLInitialResponse { name: String, response: String },
    /// SASLResponse (F)
    SASLResponse { response: String },
    /// PasswordMessage (F)
    PasswordMessage { response: String },
}

impl Password {
    /// Create new SASL initial response.
    pub fn sasl_initial(response: &str) -> Self {
        Self::SASLInitialResponse {
            name: "SCRAM-SHA-256".to_string(),
            response: response.to_owned(),
        }
    }

    /// Clear text or MD5-hashed password.
    pub fn new_password(response: impl ToString) -> Self {
        Self::PasswordMessage {
            response: response.to_string(),
        }
    }

    /// SASL continuation, sent without a NUL terminator.
    pub fn sasl_response(response: impl ToString) -> Self {
        Self::SASLResponse {
            response: response.to_string(),
        }
    }

    pub fn password(&self) -> Option<&str> {
        match self {
            Password::SASLInitialResponse { .. } | Password::SASLResponse { .. } => None,
            Password::PasswordMessage { response } => Some(response),
        }
    }
}

impl FromBytes for Password {
    fn from_bytes(mut bytes: Bytes) -> Result<Self, Error> {
        code!(bytes, 'p');
        let _len = bytes.get_i32();
        let response = c_string_buf(&mut bytes);

        Ok(Password::PasswordMessage { response })
    }
}

impl ToBytes for Password {
    fn to_bytes(&self) -> Result<Bytes, Error> {
        let mut payload = Payload::named(self.code());
        match self {
            Password::SASLResponse { response } => {
                payload.put_slice(response.as_bytes());
            }

            Password::SASLInitialResponse { name, response } => {
                payload.put_string(name);
                payload.put_i32(response.len() as i32);
                payload.put_slice(response.as_bytes());
            }

            Password::PasswordMessage { response } => {
                payload.put_string(response);
            }
        }

        Ok(payload.freeze())
    }
}

impl Protocol for Password {
    fn code(&self) -> char {
        'p'
    }
}
