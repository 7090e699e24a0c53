//! ErrorResponse (B) message.
use std::fmt::Display;
use std::time::Duration;

use super::prelude::*;
use crate::net::{c_string_buf, messages::code};

/// ErrorResponse (B) message.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    pub severity: String,
    pub code: String,
    pub message: String,
    pub detail: Option<String>,
    pub context: Option<String>,
    pub file: Option<String>,
    pub routine: Option<String>,
}

impl Default for ErrorResponse {
    fn default() -> Self {
        Self {
            severity: "ERROR".into(),
            code: String::default(),
            message: String::default(),
            detail: None,
            context: None,
            file: None,
            routine: None,
        }
    }
}

impl ErrorResponse {
    /// Authentication error.
    pub fn auth(user: &str, database: &str) -> ErrorResponse {
        ErrorResponse {
            severity: "FATAL".into(),
            code: "28P01".into(),
            message: format!("password authentication failed for user \"{}\"", user),
            detail: Some(format!("database \"{}\"", database)),
            ..Default::default()
        }
    }

    /// Client didn't send a required startup parameter.
    pub fn missing_parameter(name: &str) -> ErrorResponse {
        ErrorResponse {
            severity: "FATAL".into(),
            code: "28000".into(),
            message: format!("startup parameter \"{}\" is required", name),
            ..Default::default()
        }
    }

    /// No pool for this database.
    pub fn unknown_database(database: &str) -> ErrorResponse {
        ErrorResponse {
            severity: "FATAL".into(),
            code: "3D000".into(),
            message: format!("database \"{}\" does not exist", database),
            ..Default::default()
        }
    }

    /// Pool exists, but the user isn't configured for it.
    pub fn unknown_user(user: &str, database: &str) -> ErrorResponse {
        ErrorResponse {
            severity: "FATAL".into(),
            code: "28000".into(),
            message: format!(
                "no pool for user \"{}\" and database \"{}\"",
                user, database
            ),
            ..Default::default()
        }
    }

    pub fn protocol_violation(message: impl ToString) -> ErrorResponse {
        ErrorResponse {
            code: "08P01".into(),
            message: message.to_string(),
            ..Default::default()
        }
    }

    pub fn permission_denied(message: impl ToString) -> ErrorResponse {
        ErrorResponse {
            code: "42501".into(),
            message: message.to_string(),
            ..Default::default()
        }
    }

    pub fn no_server(message: impl ToString) -> ErrorResponse {
        ErrorResponse {
            code: "08006".into(),
            message: message.to_string(),
            ..Default::default()
        }
    }

    /// Statement timeout or COPY idle timeout.
    pub fn timeout(duration: Option<Duration>) -> ErrorResponse {
        ErrorResponse {
            code: "57014".into(),
            message: "canceling statement due to statement timeout".into(),
            detail: duration.map(|d| format!("statement_timeout of {}ms expired", d.as_millis())),
            ..Default::default()
        }
    }

    pub fn canceled(message: impl ToString) -> ErrorResponse {
        ErrorResponse {
            code: "57014".into(),
            message: message.to_string(),
            ..Default::default()
        }
    }

    pub fn syntax(err: &str) -> ErrorResponse {
        Self {
            code: "42601".into(),
            message: err.into(),
            ..Default::default()
        }
    }

    pub fn from_err(err: &impl std::error::Error) -> Self {
        Self {
            code: "58000".into(),
            message: err.to_string(),
            ..Default::default()
        }
    }

    /// Pooler is shutting down.
    pub fn shutting_down() -> ErrorResponse {
        ErrorResponse {
            severity: "FATAL".into(),
            code: "57P01".into(),
            message: "pgrelay is shutting down".into(),
            ..Default::default()
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == "FATAL" || self.severity == "PANIC"
    }
}

impl Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} {}", self.severity, self.code, self.message)?;
        if let Some(ref detail) = self.detail {
            write!(f, "\n{}", detail)?
        }
        Ok(())
    }
}

impl FromBytes for ErrorResponse {
    fn from_bytes(mut bytes: Bytes) -> Result<Self, Error> {
        code!(bytes, 'E');

        let _len = bytes.get_i32();

        let mut error_response = ErrorResponse::default();

        while bytes.has_remaining() {
            let field = bytes.get_u8() as char;
            let value = c_string_buf(&mut bytes);

            match field {
                'S' => error_response.severity = value,
                'C' => error_response.code = value,
                'M' => error_response.message = value,
                'D' => error_response.detail = Some(value),
                'W' => error_response.context = Some(value),
                'F' => error_response.file = Some(value),
                'R' => error_response.routine = Some(value),
                _ => continue,
            }
        }

        Ok(error_response)
    }
}

impl ToBytes for ErrorResponse {
    fn to_bytes(&self) -> Result<Bytes, Error> {
        let mut payload = Payload::named(self.code());

        payload.put_u8(b'S');
        payload.put_string(&self.severity);

        payload.put_u8(b'V');
        payload.put_string(&self.severity);

        payload.put_u8(b'C');
        payload.put_string(&self.code);

        payload.put_u8(b'M');
        payload.put_string(&self.message);

        if let Some(ref detail) = self.detail {
            payload.put_u8(b'D');
            payload.put_string(detail);
        }

        if let Some(ref context) = self.context {
            payload.put_u8(b'W');
            payload.put_string(context);
        }

        if let Some(ref file) = self.file {
            payload.put_u8(b'F');
            payload.put_string(file);
        }

        if let Some(ref routine) = self.routine {
            payload.put_u8(b'R');
            payload.put_string(routine);
        }

        payload.put_u8(0);

        Ok(payload.freeze())
    }
}

impl Protocol for ErrorResponse {
    fn code(&self) -> char {
        'E'
    }
}
