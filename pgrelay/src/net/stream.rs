//! Network socket wrapper allowing us to treat secure and plain
//! connections the same across the code.
use bytes::{BufMut, BytesMut};
use pin_project::pin_project;
use tokio::io::{
    split, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream, ReadBuf, ReadHalf,
    WriteHalf,
};
use tokio::net::TcpStream;
use tracing::trace;

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use super::messages::{ErrorResponse, Message, Protocol, ReadyForQuery};
use super::Error;

/// Inner stream types.
#[pin_project(project = StreamInnerProjection)]
#[derive(Debug)]
#[allow(clippy::large_enum_variant)]
enum StreamInner {
    Plain(#[pin] BufStream<TcpStream>),
    Tls(#[pin] BufStream<tokio_rustls::TlsStream<TcpStream>>),
}

/// A network socket.
#[pin_project]
#[derive(Debug)]
pub struct Stream {
    #[pin]
    inner: StreamInner,
    peer: Option<SocketAddr>,
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let project = self.project();
        match project.inner.project() {
            StreamInnerProjection::Plain(stream) => stream.poll_read(cx, buf),
            StreamInnerProjection::Tls(stream) => stream.poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, std::io::Error>> {
        let project = self.project();
        match project.inner.project() {
            StreamInnerProjection::Plain(stream) => stream.poll_write(cx, buf),
            StreamInnerProjection::Tls(stream) => stream.poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), std::io::Error>> {
        let project = self.project();
        match project.inner.project() {
            StreamInnerProjection::Plain(stream) => stream.poll_flush(cx),
            StreamInnerProjection::Tls(stream) => stream.poll_flush(cx),
        }
    }

    fn poll_shutdown(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<(), std::io::Error>> {
        let project = self.project();
        match project.inner.project() {
            StreamInnerProjection::Plain(stream) => stream.poll_shutdown(cx),
            StreamInnerProjection::Tls(stream) => stream.poll_shutdown(cx),
        }
    }
}

impl Stream {
    /// Wrap an unencrypted TCP stream.
    pub fn plain(stream: TcpStream) -> Self {
        let peer = stream.peer_addr().ok();
        Self {
            inner: StreamInner::Plain(BufStream::with_capacity(9126, 9126, stream)),
            peer,
        }
    }

    /// Wrap an encrypted TCP stream.
    pub fn tls(stream: tokio_rustls::TlsStream<TcpStream>) -> Self {
        let peer = stream.get_ref().0.peer_addr().ok();
        Self {
            inner: StreamInner::Tls(BufStream::with_capacity(9126, 9126, stream)),
            peer,
        }
    }

    /// This is a TLS stream.
    pub fn is_tls(&self) -> bool {
        matches!(self.inner, StreamInner::Tls(_))
    }

    /// Remote address, if known.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Send data via the stream.
    ///
    /// # Performance
    ///
    /// This is fast because the stream is buffered. Make sure to call [`Stream::send_flush`]
    /// for the last message in the exchange.
    pub async fn send(&mut self, message: &impl Protocol) -> Result<usize, Error> {
        let peer = self.peer;
        write(self, message, peer).await
    }

    /// Send data via the stream and flush the buffer,
    /// ensuring the message is sent immediately.
    pub async fn send_flush(&mut self, message: &impl Protocol) -> Result<usize, Error> {
        let sent = self.send(message).await?;
        eof(self.flush().await)?;

        Ok(sent)
    }

    /// Send multiple messages and flush the buffer.
    pub async fn send_many(&mut self, messages: &[impl Protocol]) -> Result<usize, Error> {
        let mut sent = 0;
        for message in messages {
            sent += self.send(message).await?;
        }
        eof(self.flush().await)?;
        Ok(sent)
    }

    /// Read a message from the stream.
    ///
    /// # Performance
    ///
    /// The stream is buffered, so this is quite fast. The pooler will perform exactly
    /// one memory allocation per protocol message.
    pub async fn read(&mut self) -> Result<Message, Error> {
        read(self).await
    }

    /// Send an error to the client and disconnect gracefully.
    pub async fn fatal(&mut self, error: ErrorResponse) -> Result<(), Error> {
        self.send_flush(&error).await?;
        let _ = self.shutdown().await;

        Ok(())
    }

    /// Send an error to the client and let them know we are ready
    /// for more queries.
    pub async fn error(&mut self, error: ErrorResponse, in_transaction: bool) -> Result<usize, Error> {
        let mut bytes_sent = self.send(&error).await?;
        bytes_sent += self
            .send_flush(&if in_transaction {
                ReadyForQuery::error()
            } else {
                ReadyForQuery::idle()
            })
            .await?;

        Ok(bytes_sent)
    }

    /// Get the wrapped TCP stream back, e.g. to start TLS.
    pub fn take(self) -> Result<TcpStream, Error> {
        match self.inner {
            StreamInner::Plain(stream) => Ok(stream.into_inner()),
            StreamInner::Tls(_) => Err(Error::Io(std::io::Error::new(
                ErrorKind::InvalidInput,
                "stream is already encrypted",
            ))),
        }
    }

    /// Split into independently owned read and write halves.
    pub fn split(self) -> (StreamReader, StreamWriter) {
        let peer = self.peer;
        let (reader, writer) = split(self);
        (StreamReader { inner: reader }, StreamWriter { inner: writer, peer })
    }
}

/// Read half of a client stream.
#[derive(Debug)]
pub struct StreamReader {
    inner: ReadHalf<Stream>,
}

impl StreamReader {
    pub async fn read(&mut self) -> Result<Message, Error> {
        read(&mut self.inner).await
    }
}

/// Write half of a client stream.
#[derive(Debug)]
pub struct StreamWriter {
    inner: WriteHalf<Stream>,
    peer: Option<SocketAddr>,
}

impl StreamWriter {
    pub async fn send(&mut self, message: &impl Protocol) -> Result<usize, Error> {
        write(&mut self.inner, message, self.peer).await
    }

    pub async fn send_flush(&mut self, message: &impl Protocol) -> Result<usize, Error> {
        let sent = self.send(message).await?;
        self.flush().await?;
        Ok(sent)
    }

    pub async fn flush(&mut self) -> Result<(), Error> {
        eof(self.inner.flush().await)
    }

    /// Send an error to the client and disconnect gracefully.
    pub async fn fatal(&mut self, error: ErrorResponse) -> Result<(), Error> {
        self.send_flush(&error).await?;
        let _ = self.inner.shutdown().await;

        Ok(())
    }
}

async fn write(
    stream: &mut (impl AsyncWrite + Unpin),
    message: &impl Protocol,
    peer: Option<SocketAddr>,
) -> Result<usize, Error> {
    let bytes = message.to_bytes()?;
    eof(stream.write_all(&bytes).await)?;
    trace!("{:?} <-- {:?}", peer, message);

    Ok(bytes.len())
}

async fn read(stream: &mut (impl AsyncRead + Unpin)) -> Result<Message, Error> {
    let code = eof(stream.read_u8().await)?;
    let len = eof(stream.read_i32().await)?;

    // Length must be at least 4 bytes.
    if len < 4 {
        return Err(Error::UnexpectedEof);
    }

    let mut bytes = BytesMut::with_capacity(len as usize + 1);
    bytes.put_u8(code);
    bytes.put_i32(len);
    bytes.resize(len as usize + 1, 0);

    eof(stream.read_exact(&mut bytes[5..]).await)?;

    Ok(Message::new(bytes.freeze()))
}

pub(crate) fn eof<T>(result: std::io::Result<T>) -> Result<T, Error> {
    match result {
        Ok(val) => Ok(val),
        Err(err) => {
            if err.kind() == ErrorKind::UnexpectedEof {
                Err(Error::UnexpectedEof)
            } else {
                Err(Error::Io(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::messages::{FromBytes, Query};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_split_halves() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let mut stream = Stream::plain(TcpStream::connect(addr).await.unwrap());
            stream.send_flush(&Query::new("SELECT 1")).await.unwrap();
            stream.read().await.unwrap()
        });

        let (server, _) = listener.accept().await.unwrap();
        let (mut reader, mut writer) = Stream::plain(server).split();

        let message = reader.read().await.unwrap();
        assert_eq!(message.code(), 'Q');
        assert_eq!(Query::from_bytes(message.payload()).unwrap().query(), "SELECT 1");

        writer.send_flush(&ReadyForQuery::idle()).await.unwrap();
        let reply = client.await.unwrap();
        assert_eq!(ReadyForQuery::from_bytes(reply.payload()).unwrap(), ReadyForQuery::idle());
    }
}
