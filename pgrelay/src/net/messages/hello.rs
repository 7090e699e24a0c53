//! Startup, SSLRequest and CancelRequest messages.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::net::{c_string_buf, Parameter, Parameters};

use super::prelude::*;

/// Protocol version 3.0.
const PROTOCOL_VERSION: i32 = 196608;
const CANCEL_REQUEST: i32 = 80877102;
const SSL_REQUEST: i32 = 80877103;
const GSSENC_REQUEST: i32 = 80877104;

/// First message a client sends. It has no code byte.
#[derive(Debug, Clone, PartialEq)]
pub enum Startup {
    /// SSLRequest (F)
    Ssl,
    /// GSSENCRequest (F)
    GssEnc,
    /// StartupMessage (F)
    Startup { params: Parameters },
    /// CancelRequest (F)
    Cancel { pid: i32, secret: i32 },
}

impl Startup {
    /// Read the startup packet from the stream.
    pub async fn from_stream(stream: &mut (impl AsyncRead + Unpin)) -> Result<Startup, Error> {
        let len = stream.read_i32().await?;
        let code = stream.read_i32().await?;

        if len < 8 {
            return Err(Error::Truncated);
        }

        match code {
            SSL_REQUEST => Ok(Startup::Ssl),

            GSSENC_REQUEST => Ok(Startup::GssEnc),

            CANCEL_REQUEST => {
                let pid = stream.read_i32().await?;
                let secret = stream.read_i32().await?;

                Ok(Startup::Cancel { pid, secret })
            }

            PROTOCOL_VERSION => {
                let mut body = vec![0u8; len as usize - 8];
                stream.read_exact(&mut body).await?;
                let mut body = Bytes::from(body);

                let mut params = Parameters::default();
                loop {
                    let name = c_string_buf(&mut body);
                    if name.is_empty() {
                        break;
                    }
                    let value = c_string_buf(&mut body);
                    params.insert(name, value);
                }

                Ok(Startup::Startup { params })
            }

            code => Err(Error::UnsupportedStartup(code)),
        }
    }

    /// Startup packet sent to a server.
    pub fn new(user: &str, database: &str, params: Vec<Parameter>) -> Self {
        let mut params = Parameters::from(params);
        params.insert("user", user);
        params.insert("database", database);

        Startup::Startup { params }
    }

    /// Request to cancel a query running on a server.
    pub fn cancel(key: &super::BackendKeyData) -> Self {
        Startup::Cancel {
            pid: key.pid,
            secret: key.secret,
        }
    }
}

impl ToBytes for Startup {
    fn to_bytes(&self) -> Result<Bytes, Error> {
        let mut payload = Payload::new();

        match self {
            Startup::Ssl => payload.put_i32(SSL_REQUEST),

            Startup::GssEnc => payload.put_i32(GSSENC_REQUEST),

            Startup::Cancel { pid, secret } => {
                payload.put_i32(CANCEL_REQUEST);
                payload.put_i32(*pid);
                payload.put_i32(*secret);
            }

            Startup::Startup { params } => {
                payload.put_i32(PROTOCOL_VERSION);
                for (name, value) in params.iter() {
                    payload.put_string(name);
                    payload.put_string(value);
                }
                payload.put_u8(0);
            }
        }

        Ok(payload.freeze())
    }
}

/// Server reply to SSLRequest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SslReply {
    Yes,
    No,
}

impl SslReply {
    pub fn byte(&self) -> u8 {
        match self {
            SslReply::Yes => b'S',
            SslReply::No => b'N',
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_startup_from_stream() {
        let startup = Startup::new(
            "alice",
            "app",
            vec![Parameter::from(("application_name", "psql"))],
        );
        let bytes = startup.to_bytes().unwrap();
        let mut reader = &bytes[..];

        let read = Startup::from_stream(&mut reader).await.unwrap();
        match read {
            Startup::Startup { params } => {
                assert_eq!(params.get("user"), Some("alice"));
                assert_eq!(params.get("database"), Some("app"));
                assert_eq!(params.get("application_name"), Some("psql"));
            }
            _ => panic!("expected startup"),
        }
    }

    #[tokio::test]
    async fn test_cancel_from_stream() {
        let bytes = Startup::Cancel { pid: 5, secret: 7 }.to_bytes().unwrap();
        assert_eq!(bytes.len(), 16);
        let mut reader = &bytes[..];

        let read = Startup::from_stream(&mut reader).await.unwrap();
        assert_eq!(read, Startup::Cancel { pid: 5, secret: 7 });
    }
}
