//! PostgreSQL wire protocol: messages, framing and sockets.

pub mod error;
pub mod messages;
pub mod parameter;
pub mod stream;
pub mod tls;
pub mod tweaks;

pub use error::Error;
pub use messages::*;
pub use parameter::{Parameter, Parameters};
pub use stream::{Stream, StreamReader, StreamWriter};
pub use tweaks::tweak;

use bytes::{Buf, Bytes};

/// Read a NUL-terminated string from the buffer, consuming the terminator.
pub fn c_string_buf(buf: &mut Bytes) -> String {
    let end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    let string = String::from_utf8_lossy(&buf[..end]).to_string();
    buf.advance((end + 1).min(buf.len()));

    string
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_c_string_buf() {
        let mut buf = Bytes::from_static(b"hello\0world\0");
        assert_eq!(c_string_buf(&mut buf), "hello");
        assert_eq!(c_string_buf(&mut buf), "world");
        assert!(buf.is_empty());
    }
}
