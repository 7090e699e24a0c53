//! Client tests, over a real socket against a mock server.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::Client;
use crate::auth::md5;
use crate::backend::pool::test::mock::{MockServer, PASSWORD, USER};
use crate::backend::pooler::test::settings;
use crate::backend::{Pooler, SessionPool, TransactionPool};
use crate::config::{PoolerMode, UserRole};
use crate::net::messages::{
    Authentication, Bind, Close, ErrorResponse, Execute, FromBytes, Message, Parse, Protocol, Query,
    ReadyForQuery, Sync, Terminate,
};
use crate::net::Stream;

/// Client side of a connection to a running [`Client`].
struct Connection {
    stream: Stream,
    server: JoinHandle<bool>,
}

impl Connection {
    /// Connect and log in. The server task returns true if the
    /// client was served.
    async fn new(pooler: Arc<dyn Pooler>, password: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (stream, addr) = listener.accept().await.unwrap();
            match Client::login(Stream::plain(stream), USER, pooler, addr)
                .await
                .unwrap()
            {
                Some(mut client) => {
                    let _ = client.run().await;
                    true
                }
                None => false,
            }
        });

        let stream = TcpStream::connect(format!("127.0.0.1:{}", port))
            .await
            .unwrap();
        let mut stream = Stream::plain(stream);

        let challenge = stream.read().await.unwrap();
        let salt = match Authentication::from_bytes(challenge.payload()).unwrap() {
            Authentication::Md5(salt) => salt,
            other => panic!("expected md5 challenge, got {:?}", other),
        };
        let response = md5::Client::new_salt(USER, password, &salt)
            .unwrap()
            .response();
        stream.send_flush(&response).await.unwrap();

        Self { stream, server }
    }

    async fn send(&mut self, messages: &[&dyn Sendable]) {
        for message in messages {
            self.stream.send(&message.message()).await.unwrap();
        }
        self.stream.flush().await.unwrap();
    }

    async fn query(&mut self, query: &str) -> Vec<Message> {
        self.send(&[&Query::new(query)]).await;
        self.until_ready().await
    }

    /// Read messages up to and including ReadyForQuery.
    async fn until_ready(&mut self) -> Vec<Message> {
        let mut messages = vec![];

        loop {
            let message = timeout(Duration::from_secs(5), self.stream.read())
                .await
                .unwrap()
                .unwrap();
            let done = message.code() == 'Z';
            messages.push(message);
            if done {
                return messages;
            }
        }
    }
}

/// Anything we can put on the wire in a test.
trait Sendable {
    fn message(&self) -> Message;
}

impl<T: Protocol> Sendable for T {
    fn message(&self) -> Message {
        Protocol::message(self).unwrap()
    }
}

fn codes(messages: &[Message]) -> Vec<char> {
    messages.iter().map(|m| m.code()).collect()
}

fn status(messages: &[Message]) -> char {
    let last = messages.last().unwrap();
    ReadyForQuery::from_bytes(last.payload()).unwrap().status
}

fn transaction_pool(mock: &MockServer) -> Arc<dyn Pooler> {
    Arc::new(TransactionPool::new(settings(
        PoolerMode::Transaction,
        1,
        &[mock],
    )))
}

async fn logged_in(pooler: Arc<dyn Pooler>) -> Connection {
    let mut conn = Connection::new(pooler, PASSWORD).await;
    let startup = conn.until_ready().await;
    assert_eq!(codes(&startup), vec!['R', 'S', 'S', 'K', 'Z']);
    conn
}

#[tokio::test]
async fn test_extended_protocol() {
    let mock = MockServer::start().await;
    let pooler = transaction_pool(&mock);
    let mut conn = logged_in(pooler.clone()).await;

    conn.send(&[
        &Parse::named("S1", "SELECT 1"),
        &Bind::new("", "S1", vec![]),
        &Execute::new(""),
        &Sync,
    ])
    .await;
    let reply = conn.until_ready().await;
    assert_eq!(codes(&reply), vec!['1', '2', 'D', 'C', 'Z']);
    assert_eq!(status(&reply), 'I');

    // Another client gets the same server connection.
    let mut other = logged_in(pooler).await;
    let reply = other.query("SELECT 1").await;
    assert_eq!(codes(&reply), vec!['T', 'D', 'C', 'Z']);
    assert_eq!(mock.stats().connections.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_wrong_password() {
    let mock = MockServer::start().await;
    let mut conn = Connection::new(transaction_pool(&mock), "wrong").await;

    let message = conn.stream.read().await.unwrap();
    assert_eq!(message.code(), 'E');
    let error = ErrorResponse::from_bytes(message.payload()).unwrap();
    assert_eq!(error.code, "28P01");
    assert!(error.is_fatal());

    assert!(!conn.server.await.unwrap());
    assert_eq!(mock.stats().connections.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn test_errors_are_not_fatal() {
    let mock = MockServer::start().await;
    let mut settings = settings(PoolerMode::Transaction, 1, &[&mock]);
    settings.user.role = UserRole::Reader;
    let mut conn = logged_in(Arc::new(TransactionPool::new(settings))).await;

    let reply = conn.query("DELETE FROM t").await;
    assert_eq!(codes(&reply), vec!['E', 'Z']);
    let error = ErrorResponse::from_bytes(reply[0].payload()).unwrap();
    assert_eq!(error.code, "42501");

    let reply = conn.query("ERROR here").await;
    assert_eq!(codes(&reply), vec!['E', 'Z']);

    let reply = conn.query("SELECT 1").await;
    assert_eq!(codes(&reply), vec!['T', 'D', 'C', 'Z']);
}

#[tokio::test]
async fn test_extended_error_skips_until_sync() {
    let mock = MockServer::start().await;
    let mut conn = logged_in(transaction_pool(&mock)).await;

    conn.send(&[&Bind::new("", "missing", vec![]), &Execute::new(""), &Sync])
        .await;
    let reply = conn.until_ready().await;
    assert_eq!(codes(&reply), vec!['E', 'Z']);
    let error = ErrorResponse::from_bytes(reply[0].payload()).unwrap();
    assert_eq!(error.code, "08P01");

    // Back to normal after Sync.
    let reply = conn.query("SELECT 1").await;
    assert_eq!(codes(&reply), vec!['T', 'D', 'C', 'Z']);
}

#[tokio::test]
async fn test_close_unknown_target() {
    let mock = MockServer::start().await;
    let mut conn = logged_in(transaction_pool(&mock)).await;

    conn.send(&[&Parse::named("S1", "SELECT 1"), &Sync]).await;
    assert_eq!(codes(&conn.until_ready().await), vec!['1', 'Z']);

    conn.send(&[
        &Close {
            kind: 'X',
            name: "S1".into(),
        },
        &Sync,
    ])
    .await;
    let reply = conn.until_ready().await;
    assert_eq!(codes(&reply), vec!['E', 'Z']);
    let error = ErrorResponse::from_bytes(reply[0].payload()).unwrap();
    assert_eq!(error.code, "08P01");

    // The statement is still there.
    conn.send(&[&Bind::new("", "S1", vec![]), &Sync]).await;
    assert_eq!(codes(&conn.until_ready().await), vec!['2', 'Z']);

    conn.send(&[&Close::named("S1"), &Sync]).await;
    assert_eq!(codes(&conn.until_ready().await), vec!['3', 'Z']);
}

#[tokio::test]
async fn test_routing_commands() {
    let mock = MockServer::start().await;
    let mut conn = logged_in(transaction_pool(&mock)).await;

    let reply = conn.query("SET SHARD TO '0'").await;
    assert_eq!(codes(&reply), vec!['C', 'Z']);

    let reply = conn.query("SHOW SHARD").await;
    assert_eq!(codes(&reply), vec!['T', 'D', 'C', 'Z']);

    let reply = conn.query("SET SERVER ROLE TO bogus").await;
    assert_eq!(codes(&reply), vec!['E', 'Z']);

    let reply = conn.query("").await;
    assert_eq!(codes(&reply), vec!['I', 'Z']);

    assert!(mock.stats().queries().is_empty());
}

#[tokio::test]
async fn test_transaction_block() {
    let mock = MockServer::start().await;
    let mut conn = logged_in(transaction_pool(&mock)).await;

    let reply = conn.query("BEGIN").await;
    assert_eq!(codes(&reply), vec!['C', 'Z']);
    assert_eq!(status(&reply), 'T');

    let reply = conn.query("SELECT 1").await;
    assert_eq!(codes(&reply), vec!['T', 'D', 'C', 'Z']);
    assert_eq!(status(&reply), 'T');

    let reply = conn.query("COMMIT").await;
    assert_eq!(codes(&reply), vec!['C', 'Z']);
    assert_eq!(status(&reply), 'I');

    assert_eq!(mock.stats().queries(), vec!["BEGIN", "SELECT 1", "COMMIT"]);
}

#[tokio::test]
async fn test_session_mode_disconnect() {
    let mock = MockServer::start().await;
    let pool = Arc::new(
        SessionPool::new(settings(PoolerMode::Session, 1, &[&mock])).unwrap(),
    );
    let mut conn = logged_in(pool.clone()).await;

    let reply = conn.query("SELECT 1").await;
    assert_eq!(codes(&reply), vec!['T', 'D', 'C', 'Z']);
    assert_eq!(pool.assigned(), 1);

    conn.send(&[&Terminate]).await;
    assert!(conn.server.await.unwrap());
    assert_eq!(pool.assigned(), 0);
}
