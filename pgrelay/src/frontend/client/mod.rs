//! Frontend client.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::{channel, Receiver};
use tokio::task::JoinHandle;
use tokio::{select, spawn};
use tracing::{debug, error, info, trace, warn};

use super::comms::{self, Comms, Link};
use super::router::{split, Block};
use super::session::{Routing, Session};
use super::Error;
use crate::auth::md5;
use crate::backend::databases::databases;
use crate::backend::{self, Pooler};
use crate::config::Role;
use crate::net::messages::{
    Authentication, BackendKeyData, Bind, BindComplete, Close, CloseComplete, Describe,
    ErrorResponse, Execute, FromBytes, FunctionCall, Message, Parse, ParseComplete, Password,
    Protocol, Query, ReadyForQuery,
};
use crate::net::{self, parameter::Parameters, Stream, StreamWriter};

#[cfg(test)]
pub mod test;

/// Frontend client.
pub struct Client {
    addr: SocketAddr,
    id: BackendKeyData,
    comms: Comms,
    pooler: Arc<dyn Pooler>,
    writer: StreamWriter,
    inbox: Receiver<Message>,
    reader: JoinHandle<()>,
    statements: HashMap<String, (Parse, Role)>,
    portals: HashMap<String, Bind>,
    routing: Routing,
    /// Transaction status reported with ReadyForQuery.
    status: ReadyForQuery,
    /// A server sent an error during the current request.
    errored: bool,
    /// Extended protocol error: ignore everything until Sync.
    skip: bool,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("addr", &self.addr)
            .field("id", &self.id)
            .field("status", &self.status)
            .finish()
    }
}

impl Client {
    /// Authenticate a client that sent its startup message and serve it
    /// until it disconnects.
    pub async fn spawn(mut stream: Stream, params: Parameters, addr: SocketAddr) -> Result<(), Error> {
        let user = match params.get_required("user") {
            Ok(user) => user,
            Err(_) => {
                stream.fatal(ErrorResponse::missing_parameter("user")).await?;
                return Ok(());
            }
        };
        let database = match params.get_required("database") {
            Ok(database) => database,
            Err(_) => {
                stream.fatal(ErrorResponse::missing_parameter("database")).await?;
                return Ok(());
            }
        };

        if comms::offline() {
            stream.fatal(ErrorResponse::shutting_down()).await?;
            return Ok(());
        }

        let databases = databases();
        let pooler = match databases.get(user, database) {
            Some(pooler) => pooler,
            None => {
                let error = if databases.exists(database) {
                    ErrorResponse::unknown_user(user, database)
                } else {
                    ErrorResponse::unknown_database(database)
                };
                warn!(user, database, "no pool for client [{}]", addr);
                stream.fatal(error).await?;
                return Ok(());
            }
        };

        if let Some(mut client) = Self::login(stream, user, pooler, addr).await? {
            info!(user, database, "client connected [{}]", addr);
            match client.run().await {
                Ok(()) => info!("client disconnected [{}]", addr),
                Err(err) if err.disconnect() => info!("client disconnected [{}]", addr),
                Err(err) => error!("client disconnected with error [{}]: {}", addr, err),
            }
        }

        Ok(())
    }

    /// MD5 authentication, then the parameters and key the client needs.
    /// Returns `None` if the client was turned away.
    pub(crate) async fn login(
        mut stream: Stream,
        user: &str,
        pooler: Arc<dyn Pooler>,
        addr: SocketAddr,
    ) -> Result<Option<Self>, Error> {
        let settings = pooler.settings();

        let challenge = md5::Client::new(user, &settings.user.password);
        stream.send_flush(&challenge.challenge()).await?;

        let response = stream.read().await?;
        let password = match response.code() {
            'p' => Password::from_bytes(response.payload())?,
            code => {
                stream
                    .fatal(ErrorResponse::protocol_violation(format!(
                        "expected password message, got '{}'",
                        code
                    )))
                    .await?;
                return Ok(None);
            }
        };

        if !challenge.check(password.password().unwrap_or_default()) {
            warn!(user, database = %settings.database, "password authentication failed [{}]", addr);
            stream
                .fatal(ErrorResponse::auth(user, &settings.database))
                .await?;
            return Ok(None);
        }

        stream.send(&Authentication::Ok).await?;

        let params = match pooler.server_info().await {
            Ok(params) => params,
            Err(err) => {
                error!("can't connect to any server for {}: {}", settings.database, err);
                let mut error = err.to_error_response();
                error.severity = "FATAL".into();
                stream.fatal(error).await?;
                return Ok(None);
            }
        };

        for param in &params {
            stream.send(param).await?;
        }

        let id = BackendKeyData::new();
        stream.send(&id).await?;
        stream.send_flush(&ReadyForQuery::idle()).await?;

        let (mut reader, writer) = stream.split();
        let (tx, inbox) = channel(1);

        // Keep reading the socket while a request runs, so the server
        // can ask for the next query or COPY data.
        let reader = spawn(async move {
            loop {
                let message = match reader.read().await {
                    Ok(message) => message,
                    Err(err) => {
                        trace!("client stream closed: {}", err);
                        break;
                    }
                };

                let terminate = message.code() == 'X';
                if tx.send(message).await.is_err() || terminate {
                    break;
                }
            }
        });

        Ok(Some(Self {
            addr,
            id,
            comms: Comms::register(id),
            pooler,
            writer,
            inbox,
            reader,
            statements: HashMap::new(),
            portals: HashMap::new(),
            routing: Routing::default(),
            status: ReadyForQuery::idle(),
            errored: false,
            skip: false,
        }))
    }

    /// Serve requests until the client leaves.
    async fn run(&mut self) -> Result<(), Error> {
        let mut shutdown = comms::shutting_down();

        loop {
            select! {
                message = self.inbox.recv() => {
                    let Some(message) = message else {
                        break;
                    };

                    if self.message(message).await? {
                        break;
                    }
                }

                _ = shutdown.changed() => (),
            }

            // Clients inside a transaction get to finish it.
            if comms::offline() && self.status.is_idle() {
                self.writer.fatal(ErrorResponse::shutting_down()).await?;
                break;
            }
        }

        Ok(())
    }

    /// Handle one message. Returns true if the client is done.
    async fn message(&mut self, message: Message) -> Result<bool, Error> {
        let code = message.code();

        match code {
            // Terminate
            'X' => return Ok(true),

            // Sync
            'S' => {
                self.skip = false;
                self.writer.send_flush(&self.status).await?;
            }

            _ if self.skip => trace!("ignoring '{}' until sync [{}]", code, self.addr),

            // Flush
            'H' => self.writer.flush().await?,

            'P' => {
                let parse = Parse::from_bytes(message.payload())?;
                let role = self.pooler.settings().router().infer_role(parse.query());
                trace!("{} is {} [{}]", parse.name, role, self.addr);
                self.statements.insert(parse.name.clone(), (parse, role));
                self.writer.send(&ParseComplete).await?;
            }

            'B' => {
                let bind = Bind::from_bytes(message.payload())?;
                if self.statements.contains_key(&bind.statement) {
                    self.portals.insert(bind.portal.clone(), bind);
                    self.writer.send(&BindComplete).await?;
                } else {
                    let err = backend::Error::ProtocolViolation(format!(
                        "prepared statement \"{}\" does not exist",
                        bind.statement
                    ));
                    self.error(err, true).await?;
                }
            }

            'C' => {
                let close = Close::from_bytes(message.payload())?;
                if close.is_statement() {
                    self.statements.remove(&close.name);
                    self.writer.send(&CloseComplete).await?;
                } else if close.is_portal() {
                    self.portals.remove(&close.name);
                    self.writer.send(&CloseComplete).await?;
                } else {
                    let err = backend::Error::ProtocolViolation(format!(
                        "expected 'S' or 'P' as close target, got '{}'",
                        close.kind
                    ));
                    self.error(err, true).await?;
                }
            }

            'D' => {
                let describe = Describe::from_bytes(message.payload())?;
                let pooler = self.pooler.clone();
                let result = pooler.describe(self, &describe).await;
                self.finish(result, true).await?;
            }

            'E' => {
                let execute = Execute::from_bytes(message.payload())?;
                let pooler = self.pooler.clone();
                let result = pooler.execute(self, &execute).await;
                self.finish(result, true).await?;
            }

            'Q' => {
                let query = Query::from_bytes(message.payload())?;
                self.query(query.query()).await?;
            }

            'F' => {
                let call = FunctionCall::from_bytes(message.payload())?;
                let pooler = self.pooler.clone();
                let result = pooler.call_function(self, &call).await;
                self.finish(result, false).await?;
            }

            code => {
                self.error(backend::Error::UnexpectedMessage(code), false)
                    .await?;
            }
        }

        Ok(false)
    }

    /// Simple query: routing commands are answered here, everything else
    /// goes to a server, transaction blocks as one request.
    async fn query(&mut self, query: &str) -> Result<(), Error> {
        let router = self.pooler.settings().router();

        match router.try_handle(self, query).await {
            Ok(true) => {
                self.writer.send_flush(&self.status).await?;
                return Ok(());
            }
            Ok(false) => (),
            Err(err) => {
                self.writer.send(&err.to_error_response()).await?;
                self.writer.send_flush(&self.status).await?;
                return Ok(());
            }
        }

        let pooler = self.pooler.clone();
        let mut result = Ok(self.status);
        self.errored = false;

        for block in split(query) {
            result = match block {
                Block::Simple(query) => pooler.simple_query(self, query).await,
                Block::Transaction(query) => pooler.transaction(self, query).await,
            };

            // Statements after an error are skipped.
            if result.is_err() || self.errored {
                break;
            }
        }

        self.finish(result, false).await
    }

    /// Send ReadyForQuery, now for simple requests or on Sync for extended ones.
    async fn finish(
        &mut self,
        result: Result<ReadyForQuery, backend::Error>,
        extended: bool,
    ) -> Result<(), Error> {
        match result {
            Ok(status) => {
                self.status = status;
                if !extended {
                    self.writer.send_flush(&status).await?;
                }
                Ok(())
            }
            Err(err) => self.error(err, extended).await,
        }
    }

    /// Report an error. Fatal errors end the session.
    async fn error(&mut self, err: backend::Error, extended: bool) -> Result<(), Error> {
        if err.is_fatal() {
            self.writer.fatal(err.to_error_response()).await?;
            return Err(err.into());
        }

        debug!("request failed: {} [{}]", err, self.addr);

        // The server connection is gone, and so is any transaction on it.
        if err.evicts() || matches!(err, backend::Error::Timeout(_)) {
            self.status = ReadyForQuery::idle();
        }

        self.writer.send(&err.to_error_response()).await?;

        if extended {
            self.skip = true;
        } else {
            self.writer.send_flush(&self.status).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl Session for Client {
    fn id(&self) -> BackendKeyData {
        self.id
    }

    fn statement(&self, name: &str) -> Option<&Parse> {
        self.statements.get(name).map(|(parse, _)| parse)
    }

    fn statement_role(&self, name: &str) -> Option<Role> {
        self.statements.get(name).map(|(_, role)| *role)
    }

    fn portal(&self, name: &str) -> Option<&Bind> {
        self.portals.get(name)
    }

    fn routing(&self) -> &Routing {
        &self.routing
    }

    fn routing_mut(&mut self) -> &mut Routing {
        &mut self.routing
    }

    fn link(&mut self, link: Option<Link>) {
        self.comms.link(link);
    }

    fn linked(&self) -> Option<Link> {
        self.comms.linked()
    }

    async fn send(&mut self, message: Message) -> Result<(), net::Error> {
        if message.code() == 'E' {
            self.errored = true;
        }
        self.writer.send(&message).await?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), net::Error> {
        self.writer.flush().await
    }

    async fn recv(&mut self) -> Result<Message, net::Error> {
        self.inbox.recv().await.ok_or(net::Error::Disconnected)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.reader.abort();
        self.pooler.on_disconnect(&self.id);
    }
}
