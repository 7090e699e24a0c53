//! PostgreSQL wire protocol messages.

pub mod auth;
pub mod backend_key;
pub mod bind;
pub mod bind_complete;
pub mod close;
pub mod close_complete;
pub mod command_complete;
pub mod copy;
pub mod data_row;
pub mod describe;
pub mod empty_query;
pub mod error_response;
pub mod execute;
pub mod flush;
pub mod function_call;
pub mod hello;
pub mod parameter_status;
pub mod parse;
pub mod parse_complete;
pub mod query;
pub mod rfq;
pub mod row_description;
pub mod sync;
pub mod terminate;

pub use auth::{Authentication, Password};
pub use backend_key::BackendKeyData;
pub use bind::{Bind, Parameter as BindParameter};
pub use bind_complete::BindComplete;
pub use close::Close;
pub use close_complete::CloseComplete;
pub use command_complete::CommandComplete;
pub use copy::{CopyData, CopyDone, CopyFail};
pub use data_row::DataRow;
pub use describe::Describe;
pub use empty_query::EmptyQueryResponse;
pub use error_response::ErrorResponse;
pub use execute::Execute;
pub use flush::Flush;
pub use function_call::FunctionCall;
pub use hello::{SslReply, Startup};
pub use parameter_status::ParameterStatus;
pub use parse::Parse;
pub use parse_complete::ParseComplete;
pub use query::Query;
pub use rfq::{ReadyForQuery, TransactionState};
pub use row_description::{Field, RowDescription};
pub use sync::Sync;
pub use terminate::Terminate;

use std::ops::{Deref, DerefMut};

use bytes::{BufMut, Bytes, BytesMut};

use super::Error;

/// Convert a message to its wire representation.
pub trait ToBytes {
    fn to_bytes(&self) -> Result<Bytes, Error>;
}

/// Parse a message from its wire representation, including the code and length.
pub trait FromBytes: Sized {
    fn from_bytes(bytes: Bytes) -> Result<Self, Error>;
}

/// A protocol message with a one-byte code.
pub trait Protocol: ToBytes + std::fmt::Debug {
    fn code(&self) -> char;

    /// Serialize into a generic message.
    fn message(&self) -> Result<Message, Error> {
        Ok(Message::new(self.to_bytes()?))
    }
}

/// A framed protocol message: code, length and payload.
#[derive(Clone, PartialEq)]
pub struct Message {
    payload: Bytes,
}

impl Message {
    /// Wrap a complete frame.
    pub fn new(payload: Bytes) -> Self {
        Self { payload }
    }

    /// The whole frame, ready to be parsed by [`FromBytes`].
    pub fn payload(&self) -> Bytes {
        self.payload.clone()
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.len() <= 5
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("code", &self.code())
            .field("len", &self.len())
            .finish()
    }
}

impl ToBytes for Message {
    fn to_bytes(&self) -> Result<Bytes, Error> {
        Ok(self.payload.clone())
    }
}

impl Protocol for Message {
    fn code(&self) -> char {
        self.payload.first().copied().unwrap_or_default() as char
    }
}

/// Check the message code, advancing past it.
macro_rules! code {
    ($bytes:expr, $code:expr) => {{
        let got = $bytes.get_u8() as char;
        if got != $code {
            return Err(crate::net::Error::UnexpectedPayload {
                expected: $code,
                got,
            });
        }
    }};
}

pub(crate) use code;

/// Message body builder. Writes the code and length on [`Payload::freeze`].
#[derive(Debug, Default)]
pub struct Payload {
    bytes: BytesMut,
    name: Option<char>,
}

impl Payload {
    /// Message with a code.
    pub fn named(name: char) -> Self {
        Self {
            bytes: BytesMut::new(),
            name: Some(name),
        }
    }

    /// Message without a code, e.g. the startup packet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a NUL-terminated string.
    pub fn put_string(&mut self, string: &str) {
        self.bytes.put_slice(string.as_bytes());
        self.bytes.put_u8(0);
    }

    /// Finish the message.
    pub fn freeze(self) -> Bytes {
        let mut frame = BytesMut::with_capacity(self.bytes.len() + 5);
        if let Some(name) = self.name {
            frame.put_u8(name as u8);
        }
        frame.put_i32(self.bytes.len() as i32 + 4);
        frame.put(self.bytes);

        frame.freeze()
    }
}

impl Deref for Payload {
    type Target = BytesMut;

    fn deref(&self) -> &Self::Target {
        &self.bytes
    }
}

impl DerefMut for Payload {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.bytes
    }
}

pub mod prelude {
    pub use super::{FromBytes, Message, Payload, Protocol, ToBytes};
    pub use crate::net::Error;
    pub use bytes::{Buf, BufMut, Bytes, BytesMut};
}
