//! Scripted PostgreSQL server.
//!
//! Speaks enough of the protocol for the pooler: startup, cleartext, MD5
//! and SCRAM auth, simple queries, transactions, the extended protocol, COPY FROM
//! STDIN and cancel requests. Queries are matched by text:
//!
//! * `BEGIN`/`START` opens a transaction, `END`/`COMMIT`/`ROLLBACK` closes it,
//! * `DEALLOCATE "name"` drops a statement,
//! * `COPY ...` starts COPY FROM STDIN,
//! * `ERROR ...` fails, as does parsing it,
//! * `HANG ...` never answers,
//! * anything else returns one row with `1`.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::{Buf, BufMut};
use parking_lot::Mutex;
use scram::{
    hash_password, AuthenticationProvider, AuthenticationStatus, PasswordInfo, ScramServer,
};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::select;
use tokio::spawn;
use tokio::sync::watch;

use crate::auth::md5;
use crate::auth::scram::MECHANISM;
use crate::backend::pool::Address;
use crate::net::{
    messages::{
        Authentication, BackendKeyData, BindComplete, CloseComplete, CommandComplete, DataRow,
        ErrorResponse, Field, FromBytes, Message, ParameterStatus, Parse, ParseComplete,
        Password, Payload, Protocol, Query, ReadyForQuery, RowDescription, Startup,
    },
    c_string_buf, Error, Stream,
};

pub(crate) const USER: &str = "pgrelay";
pub(crate) const PASSWORD: &str = "pgrelay";
pub(crate) const DATABASE: &str = "pgrelay";

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum MockAuth {
    Trust,
    ClearText,
    Md5,
    Scram,
    /// SCRAM, but Ok comes right after the client final message.
    ScramWithoutFinal,
}

/// Password lookup for the SCRAM server.
struct MockPasswords;

impl AuthenticationProvider for MockPasswords {
    fn get_password_for(&self, _user: &str) -> Option<PasswordInfo> {
        let iterations = NonZeroU32::new(4096).unwrap();
        let salt = b"pgrelay-salt".to_vec();
        let hash = hash_password(PASSWORD, iterations, &salt);
        Some(PasswordInfo::new(hash.to_vec(), iterations.get() as u16, salt))
    }
}

/// What the server saw.
#[derive(Debug, Default)]
pub(crate) struct Stats {
    pub(crate) connections: AtomicUsize,
    pub(crate) parses: AtomicUsize,
    pub(crate) binds: AtomicUsize,
    pub(crate) cancels: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl Stats {
    /// Simple queries received, in order.
    pub(crate) fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

#[derive(Debug)]
pub(crate) struct MockServer {
    addr: SocketAddr,
    stats: Arc<Stats>,
    shutdown: watch::Sender<bool>,
}

impl MockServer {
    pub(crate) async fn start() -> Self {
        Self::with_auth(MockAuth::Trust).await
    }

    pub(crate) async fn with_auth(auth: MockAuth) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stats = Arc::new(Stats::default());
        let (shutdown, _) = watch::channel(false);

        let server = Self {
            addr,
            stats: stats.clone(),
            shutdown: shutdown.clone(),
        };

        spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let stats = stats.clone();
                let shutdown = shutdown.subscribe();
                spawn(async move {
                    let _ = serve(stream, auth, stats, shutdown).await;
                });
            }
        });

        server
    }

    /// Address with the right credentials.
    pub(crate) fn address(&self) -> Address {
        Address {
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
            database_name: DATABASE.into(),
            user: USER.into(),
            password: PASSWORD.into(),
        }
    }

    pub(crate) fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Close every open connection.
    pub(crate) fn disconnect_all(&self) {
        let _ = self.shutdown.send(true);
    }
}

async fn serve(
    stream: TcpStream,
    auth: MockAuth,
    stats: Arc<Stats>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Error> {
    let mut stream = Stream::plain(stream);

    let params = match Startup::from_stream(&mut stream).await? {
        Startup::Startup { params } => params,
        Startup::Cancel { .. } => {
            stats.cancels.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }
        _ => return Ok(()),
    };
    let user = params.get("user").unwrap_or_default().to_string();

    let password = match auth {
        MockAuth::Trust => None,
        MockAuth::ClearText => {
            stream.send_flush(&Authentication::ClearTextPassword).await?;
            let password = Password::from_bytes(stream.read().await?.payload())?;
            Some(password.password() == Some(PASSWORD))
        }
        MockAuth::Md5 => {
            let client = md5::Client::new(&user, PASSWORD);
            stream.send_flush(&client.challenge()).await?;
            let password = Password::from_bytes(stream.read().await?.payload())?;
            Some(client.check(password.password().unwrap_or_default()))
        }
        MockAuth::Scram | MockAuth::ScramWithoutFinal => {
            Some(scram(&mut stream, auth == MockAuth::Scram).await?)
        }
    };

    if password == Some(false) {
        return stream.fatal(ErrorResponse::auth(&user, DATABASE)).await;
    }

    stats.connections.fetch_add(1, Ordering::Relaxed);

    stream.send(&Authentication::Ok).await?;
    stream
        .send(&ParameterStatus::from(("server_version", "16.0")))
        .await?;
    stream
        .send(&ParameterStatus::from(("client_encoding", "UTF8")))
        .await?;
    stream.send(&BackendKeyData::new()).await?;
    stream.send_flush(&ReadyForQuery::idle()).await?;

    let mut session = MockSession::new(stats);

    loop {
        let message = select! {
            message = stream.read() => message?,
            _ = shutdown.changed() => return Ok(()),
        };

        if !session.handle(&mut stream, message).await? {
            return Ok(());
        }
    }
}

/// SCRAM-SHA-256 exchange. Returns true if the client knew the password.
async fn scram(stream: &mut Stream, send_final: bool) -> Result<bool, Error> {
    stream
        .send_flush(&Authentication::Sasl(vec![MECHANISM.into()]))
        .await?;

    // SASLInitialResponse: mechanism, length, client first message.
    let mut initial = stream.read().await?.payload();
    initial.advance(5);
    let _mechanism = c_string_buf(&mut initial);
    let _len = initial.get_i32();
    let client_first = String::from_utf8_lossy(&initial).to_string();

    let server = ScramServer::new(MockPasswords);
    let Ok(server) = server.handle_client_first(&client_first) else {
        return Ok(false);
    };
    let (server, server_first) = server.server_first();
    stream
        .send_flush(&Authentication::SaslContinue(server_first))
        .await?;

    // SASLResponse: client final message.
    let mut response = stream.read().await?.payload();
    response.advance(5);
    let client_final = String::from_utf8_lossy(&response).to_string();

    let Ok(server) = server.handle_client_final(&client_final) else {
        return Ok(false);
    };
    let (status, server_final) = server.server_final();
    if status != AuthenticationStatus::Authenticated {
        return Ok(false);
    }

    if send_final {
        stream.send(&Authentication::SaslFinal(server_final)).await?;
    }

    Ok(true)
}

struct MockSession {
    stats: Arc<Stats>,
    status: char,
    statements: HashSet<String>,
    /// Extended protocol error, skip until Sync.
    failed: bool,
}

impl MockSession {
    fn new(stats: Arc<Stats>) -> Self {
        Self {
            stats,
            status: 'I',
            statements: HashSet::new(),
            failed: false,
        }
    }

    fn ready(&self) -> ReadyForQuery {
        ReadyForQuery {
            status: self.status,
        }
    }

    async fn error(&mut self, stream: &mut Stream, code: &str, extended: bool) -> Result<(), Error> {
        if self.status == 'T' {
            self.status = 'E';
        }
        self.failed = extended;
        stream
            .send(&ErrorResponse {
                code: code.into(),
                message: "mock error".into(),
                ..Default::default()
            })
            .await?;
        Ok(())
    }

    async fn row(&self, stream: &mut Stream) -> Result<(), Error> {
        let mut row = DataRow::new();
        row.add("1");
        stream.send(&row).await?;
        stream.send(&CommandComplete::new("SELECT 1")).await?;
        Ok(())
    }

    /// Returns false when the client terminated.
    async fn handle(&mut self, stream: &mut Stream, message: Message) -> Result<bool, Error> {
        let code = message.code();

        if self.failed && matches!(code, 'P' | 'B' | 'D' | 'E' | 'C' | 'H') {
            return Ok(true);
        }

        match code {
            'Q' => {
                let query = Query::from_bytes(message.payload())?.query().to_string();
                self.stats.queries.lock().push(query.clone());
                self.query(stream, &query).await?;
            }

            'P' => {
                let parse = Parse::from_bytes(message.payload())?;
                self.stats.parses.fetch_add(1, Ordering::Relaxed);

                if parse.query.starts_with("ERROR") {
                    self.error(stream, "42601", true).await?;
                } else if !parse.anonymous() && self.statements.contains(&parse.name) {
                    self.error(stream, "42P05", true).await?;
                } else {
                    self.statements.insert(parse.name);
                    stream.send(&ParseComplete).await?;
                }
            }

            'B' => {
                self.stats.binds.fetch_add(1, Ordering::Relaxed);
                stream.send(&BindComplete).await?;
            }

            'D' => {
                stream
                    .send(&RowDescription::new(&[Field::text("?column?")]))
                    .await?;
            }

            'E' => self.row(stream).await?,

            'C' => {
                stream.send(&CloseComplete).await?;
            }

            'S' => {
                self.failed = false;
                stream.send_flush(&self.ready()).await?;
            }

            'F' => {
                let mut payload = Payload::named('V');
                payload.put_i32(1);
                payload.put_u8(b'1');
                stream.send(&Message::new(payload.freeze())).await?;
                stream.send_flush(&self.ready()).await?;
            }

            'H' => stream.flush().await?,

            'X' => return Ok(false),

            _ => (),
        }

        Ok(true)
    }

    async fn query(&mut self, stream: &mut Stream, query: &str) -> Result<(), Error> {
        let upper = query.trim().to_uppercase();

        if upper.starts_with("HANG") {
            return Ok(());
        }

        if self.status == 'E' && !["END", "COMMIT", "ROLLBACK"].iter().any(|c| upper.starts_with(c)) {
            self.error(stream, "25P02", false).await?;
        } else if upper.starts_with("BEGIN") || upper.starts_with("START") {
            self.status = 'T';
            stream.send(&CommandComplete::new("BEGIN")).await?;
        } else if ["END", "COMMIT", "ROLLBACK"].iter().any(|c| upper.starts_with(c)) {
            let command = if self.status == 'E' { "ROLLBACK" } else { "COMMIT" };
            self.status = 'I';
            stream.send(&CommandComplete::new(command)).await?;
        } else if upper.starts_with("DEALLOCATE") {
            let name = query.split('"').nth(1).unwrap_or_default();
            self.statements.remove(name);
            stream.send(&CommandComplete::new("DEALLOCATE")).await?;
        } else if upper.starts_with("COPY") {
            return self.copy(stream).await;
        } else if upper.starts_with("ERROR") {
            self.error(stream, "42601", false).await?;
        } else {
            stream
                .send(&RowDescription::new(&[Field::text("?column?")]))
                .await?;
            self.row(stream).await?;
        }

        stream.send_flush(&self.ready()).await?;
        Ok(())
    }

    async fn copy(&mut self, stream: &mut Stream) -> Result<(), Error> {
        // CopyInResponse: text format, no columns.
        let mut payload = Payload::named('G');
        payload.put_i8(0);
        payload.put_i16(0);
        stream.send_flush(&Message::new(payload.freeze())).await?;

        let mut rows = 0;
        loop {
            let message = stream.read().await?;
            match message.code() {
                'd' => rows += 1,
                'c' => {
                    stream
                        .send(&CommandComplete::new(format!("COPY {}", rows)))
                        .await?;
                    break;
                }
                'f' => {
                    self.error(stream, "57014", false).await?;
                    break;
                }
                _ => (),
            }
        }

        stream.send_flush(&self.ready()).await?;
        Ok(())
    }
}
