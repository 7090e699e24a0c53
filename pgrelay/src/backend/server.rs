//! PostgreSQL server connection.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, trace, warn};

use super::{pool::Address, Error, Request, ServerOptions, State};
use crate::auth::{md5, scram};
use crate::frontend::Session;
use crate::net::{
    messages::{
        Authentication, BackendKeyData, Bind, Close, CopyFail, Describe, ErrorResponse, Execute,
        FromBytes, FunctionCall, Message, ParameterStatus, Parse, Password, Protocol, Query,
        ReadyForQuery, Startup, Sync, Terminate, ToBytes,
    },
    tweak, Stream,
};

/// How many times stabilization closes a transaction before giving up.
const STABILIZE_ATTEMPTS: usize = 3;

/// Cache entry written during the current request, not yet acknowledged.
#[derive(Debug, Clone)]
enum Pending {
    Statement(String),
    Portal(String),
}

/// What to do with ReadyForQuery while relaying.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Relay {
    /// ReadyForQuery ends the request.
    Request,
    /// ReadyForQuery inside a transaction block is forwarded and the
    /// client's next query is sent to the same server.
    Transaction,
}

/// PostgreSQL server connection.
#[derive(Debug)]
pub struct Server {
    addr: Address,
    stream: Stream,
    id: BackendKeyData,
    params: Vec<ParameterStatus>,
    state: State,
    status: ReadyForQuery,
    client: Option<BackendKeyData>,
    statements: HashMap<String, Parse>,
    portals: HashMap<String, Bind>,
    pending: VecDeque<Pending>,
    healthy: bool,
    copy_timeout: Duration,
    connected_at: Instant,
    last_used: Instant,
}

impl Server {
    /// Create new PostgreSQL server connection.
    pub async fn connect(addr: &Address, options: ServerOptions) -> Result<Self, Error> {
        debug!("=> {}", addr);
        let stream = TcpStream::connect(addr.addr()).await?;
        tweak(&stream)?;

        let now = Instant::now();
        let mut server = Server {
            addr: addr.clone(),
            stream: Stream::plain(stream),
            id: BackendKeyData::default(),
            params: vec![],
            state: State::New,
            status: ReadyForQuery::idle(),
            client: None,
            statements: HashMap::new(),
            portals: HashMap::new(),
            pending: VecDeque::new(),
            healthy: true,
            copy_timeout: options.copy_timeout,
            connected_at: now,
            last_used: now,
        };

        server.startup(options).await?;

        info!("new server connection [{}]", server.addr);

        Ok(server)
    }

    /// Startup, authentication, then server parameters until ReadyForQuery.
    async fn startup(&mut self, options: ServerOptions) -> Result<(), Error> {
        let startup = Startup::new(&self.addr.user, &self.addr.database_name, options.params);
        self.stream.write_all(&startup.to_bytes()?).await?;
        self.stream.flush().await?;
        self.state = State::Authenticating;

        let mut scram = scram::Client::new(&self.addr.user, &self.addr.password);
        let mut sasl = false;

        loop {
            let message = self.stream.read().await?;

            match message.code() {
                'E' => {
                    let error = ErrorResponse::from_bytes(message.payload())?;
                    return Err(Error::ConnectionError(Box::new(error)));
                }

                'R' => match Authentication::from_bytes(message.payload())? {
                    // The server must prove it knows the password too.
                    Authentication::Ok if sasl && !scram.done() => {
                        return Err(crate::auth::Error::Unverified.into());
                    }

                    Authentication::Ok => break,

                    Authentication::ClearTextPassword => {
                        let password = Password::new_password(&self.addr.password);
                        self.stream.send_flush(&password).await?;
                    }

                    Authentication::Md5(salt) => {
                        let client = md5::Client::new_salt(&self.addr.user, &self.addr.password, &salt)?;
                        self.stream.send_flush(&client.response()).await?;
                    }

                    Authentication::Sasl(mechanisms) => {
                        scram::Client::check_mechanisms(&mechanisms)?;
                        sasl = true;
                        let initial = Password::sasl_initial(&scram.start()?);
                        self.stream.send_flush(&initial).await?;
                    }

                    Authentication::SaslContinue(data) => {
                        if let Some(reply) = scram.next(&data)? {
                            self.stream.send_flush(&Password::sasl_response(reply)).await?;
                        }
                    }

                    Authentication::SaslFinal(data) => {
                        scram.next(&data)?;
                    }
                },

                code => return Err(Error::UnexpectedMessage(code)),
            }
        }

        let mut id = None;

        loop {
            let message = self.stream.read().await?;

            match message.code() {
                // ReadyForQuery (B)
                'Z' => {
                    self.status = ReadyForQuery::from_bytes(message.payload())?;
                    break;
                }
                // ParameterStatus (B)
                'S' => self
                    .params
                    .push(ParameterStatus::from_bytes(message.payload())?),
                // BackendKeyData (B)
                'K' => id = Some(BackendKeyData::from_bytes(message.payload())?),
                // ErrorResponse (B)
                'E' => {
                    let error = ErrorResponse::from_bytes(message.payload())?;
                    return Err(Error::ConnectionError(Box::new(error)));
                }
                // NoticeResponse (B)
                'N' => debug!("notice during startup [{}]", self.addr),

                code => return Err(Error::UnexpectedMessage(code)),
            }
        }

        self.id = id.ok_or(Error::NoBackendKeyData)?;
        self.state = State::Idle;

        Ok(())
    }

    /// Request query cancellation for the given backend server identifier.
    pub async fn cancel(addr: &Address, id: &BackendKeyData) -> Result<(), Error> {
        let mut stream = TcpStream::connect(addr.addr()).await?;
        stream.write_all(&Startup::cancel(id).to_bytes()?).await?;
        stream.flush().await?;

        Ok(())
    }

    /// Send a message to the server. The write is buffered.
    pub async fn send(&mut self, message: &impl Protocol) -> Result<(), Error> {
        if self.state == State::Closed {
            return Err(Error::Closed);
        }

        if let Err(err) = self.stream.send(message).await {
            self.state = State::Closed;
            return Err(err.into());
        }

        let code = message.code();
        // A simple query replaces the unnamed statement and portal.
        if code == 'Q' {
            self.statements.remove("");
            self.portals.remove("");
        }
        self.state = self.state.sent(code);

        Ok(())
    }

    /// Flush buffered messages to the server.
    pub async fn flush(&mut self) -> Result<(), Error> {
        if let Err(err) = self.stream.flush().await {
            self.state = State::Closed;
            return Err(err.into());
        }

        Ok(())
    }

    /// Read one message from the server.
    pub async fn read(&mut self) -> Result<Message, Error> {
        let message = match self.stream.read().await {
            Ok(message) => message,
            Err(err) => {
                self.state = State::Closed;
                return Err(err.into());
            }
        };

        trace!("{:?} --> [{}]", message, self.addr);

        let code = message.code();
        match code {
            'Z' => {
                self.status = ReadyForQuery::from_bytes(message.payload())?;
                self.pending.clear();
                // Portals don't outlive the transaction.
                if self.status.is_idle() {
                    self.portals.clear();
                }
            }
            // ParseComplete, BindComplete
            '1' | '2' => {
                self.pending.pop_front();
            }
            // Everything after the failed message was skipped.
            'E' => self.forget_pending(),
            _ => (),
        }

        self.state = self.state.received(code);
        self.last_used = Instant::now();

        Ok(message)
    }

    fn forget_pending(&mut self) {
        for pending in self.pending.drain(..) {
            match pending {
                Pending::Statement(name) => {
                    self.statements.remove(&name);
                }
                Pending::Portal(name) => {
                    self.portals.remove(&name);
                }
            }
        }
    }

    /// Make sure the server has this statement, sending Parse only
    /// if it doesn't or has a different definition.
    pub async fn ensure_statement(&mut self, parse: &Parse) -> Result<(), Error> {
        let cached = self
            .statements
            .get(&parse.name)
            .map(|cached| cached == parse);

        match cached {
            Some(true) => return Ok(()),
            Some(false) if !parse.anonymous() => self.deallocate(&parse.name).await?,
            _ => (),
        }

        self.portals.retain(|_, bind| bind.statement != parse.name);
        self.send(parse).await?;
        self.statements.insert(parse.name.clone(), parse.clone());
        self.pending.push_back(Pending::Statement(parse.name.clone()));

        Ok(())
    }

    /// Make sure the server has this portal and the statement it's bound to.
    pub async fn ensure_portal(&mut self, bind: &Bind, parse: &Parse) -> Result<(), Error> {
        self.ensure_statement(parse).await?;

        let cached = self.portals.get(&bind.portal).map(|cached| cached == bind);

        match cached {
            Some(true) => return Ok(()),
            Some(false) if !bind.anonymous() => self.send(&Close::portal(&bind.portal)).await?,
            _ => (),
        }

        self.send(bind).await?;
        self.portals.insert(bind.portal.clone(), bind.clone());
        self.pending.push_back(Pending::Portal(bind.portal.clone()));

        Ok(())
    }

    /// Drop a named statement on the server.
    async fn deallocate(&mut self, name: &str) -> Result<(), Error> {
        debug!("deallocating \"{}\" [{}]", name, self.addr);

        self.statements.remove(name);
        self.portals.retain(|_, bind| bind.statement != name);
        self.send(&Query::new(format!(
            "DEALLOCATE \"{}\"",
            name.replace('"', "\"\"")
        )))
        .await?;
        self.flush().await?;
        self.drain().await
    }

    /// Read and discard messages until ReadyForQuery.
    pub async fn drain(&mut self) -> Result<(), Error> {
        loop {
            let message = self.read().await?;
            match message.code() {
                'Z' => return Ok(()),
                'G' | 'W' => self.copy_fail("pgrelay: connection reset").await?,
                _ => (),
            }
        }
    }

    /// Execute a client request.
    pub async fn handle(
        &mut self,
        session: &mut dyn Session,
        request: &Request<'_>,
    ) -> Result<ReadyForQuery, Error> {
        match request {
            Request::Describe(describe) => self.describe(session, describe).await,
            Request::Execute(execute) => self.execute(session, execute).await,
            Request::SimpleQuery(query) => self.simple_query(session, query).await,
            Request::Transaction(query) => self.transaction(session, query).await,
            Request::CallFunction(call) => self.call_function(session, call).await,
        }
    }

    /// Describe a statement or portal the client created.
    pub async fn describe(
        &mut self,
        session: &mut dyn Session,
        describe: &Describe,
    ) -> Result<ReadyForQuery, Error> {
        if describe.is_statement() {
            let parse = Self::statement(session, &describe.name)?;
            self.ensure_statement(&parse).await?;
        } else if describe.is_portal() {
            let (bind, parse) = Self::portal(session, &describe.name)?;
            self.ensure_portal(&bind, &parse).await?;
        } else {
            return Err(Error::ProtocolViolation(format!(
                "expected 'S' or 'P' as describe target, got '{}'",
                describe.kind
            )));
        }

        self.send(describe).await?;
        self.sync(session).await
    }

    /// Execute a portal the client bound.
    pub async fn execute(
        &mut self,
        session: &mut dyn Session,
        execute: &Execute,
    ) -> Result<ReadyForQuery, Error> {
        let (bind, parse) = Self::portal(session, &execute.portal)?;
        self.ensure_portal(&bind, &parse).await?;

        self.send(execute).await?;
        self.sync(session).await
    }

    /// Run one simple query.
    pub async fn simple_query(
        &mut self,
        session: &mut dyn Session,
        query: &str,
    ) -> Result<ReadyForQuery, Error> {
        self.send(&Query::new(query)).await?;
        self.flush().await?;
        self.relay(session, Relay::Request).await
    }

    /// Run a simple query and keep relaying the client's queries
    /// until the transaction it opened is closed.
    pub async fn transaction(
        &mut self,
        session: &mut dyn Session,
        query: &str,
    ) -> Result<ReadyForQuery, Error> {
        self.send(&Query::new(query)).await?;
        self.flush().await?;
        self.relay(session, Relay::Transaction).await
    }

    /// FunctionCall.
    pub async fn call_function(
        &mut self,
        session: &mut dyn Session,
        call: &FunctionCall,
    ) -> Result<ReadyForQuery, Error> {
        self.send(call).await?;
        self.flush().await?;
        self.relay(session, Relay::Request).await
    }

    async fn sync(&mut self, session: &mut dyn Session) -> Result<ReadyForQuery, Error> {
        self.send(&Sync).await?;
        self.flush().await?;
        self.relay(session, Relay::Request).await
    }

    fn statement(session: &dyn Session, name: &str) -> Result<Parse, Error> {
        session.statement(name).cloned().ok_or_else(|| {
            Error::ProtocolViolation(format!("prepared statement \"{}\" does not exist", name))
        })
    }

    fn portal(session: &dyn Session, name: &str) -> Result<(Bind, Parse), Error> {
        let bind = session.portal(name).cloned().ok_or_else(|| {
            Error::ProtocolViolation(format!("portal \"{}\" does not exist", name))
        })?;
        let parse = Self::statement(session, &bind.statement)?;

        Ok((bind, parse))
    }

    /// Forward server messages to the client until the request is done.
    ///
    /// If the client goes away, the server is still read to completion
    /// and the client error is returned at the end.
    async fn relay(
        &mut self,
        session: &mut dyn Session,
        mode: Relay,
    ) -> Result<ReadyForQuery, Error> {
        let mut client_error: Option<Error> = None;

        loop {
            let message = self.read().await?;

            match message.code() {
                // The client got ParseComplete, BindComplete and CloseComplete from us already.
                '1' | '2' | '3' => (),

                'Z' => {
                    if mode == Relay::Transaction
                        && client_error.is_none()
                        && !self.status.is_idle()
                    {
                        if let Err(err) = self.next_query(session, message).await {
                            if err.evicts() {
                                return Err(err);
                            }
                            debug!("closing abandoned transaction: {} [{}]", err, self.addr);
                            client_error = Some(err);
                            self.send(&Query::new("END")).await?;
                            self.flush().await?;
                        }
                        continue;
                    }

                    return match client_error {
                        Some(err) => Err(err),
                        None => Ok(self.status),
                    };
                }

                // CopyInResponse, CopyBothResponse
                'G' | 'W' => {
                    let result = if client_error.is_none() {
                        self.copy_in(session, message).await
                    } else {
                        self.copy_fail("pgrelay: client went away").await
                    };

                    if let Err(err) = result {
                        if err.evicts() {
                            return Err(err);
                        }
                        client_error.get_or_insert(err);
                    }
                }

                _ => {
                    if client_error.is_none() {
                        if let Err(err) = session.send(message).await {
                            client_error = Some(Error::canceled(err));
                        }
                    }
                }
            }
        }
    }

    /// Let the client know it's inside a transaction and send its next query.
    async fn next_query(&mut self, session: &mut dyn Session, ready: Message) -> Result<(), Error> {
        session.send(ready).await.map_err(Error::canceled)?;
        session.flush().await.map_err(Error::canceled)?;

        let message = session.recv().await.map_err(Error::canceled)?;
        if message.code() != 'Q' {
            return Err(Error::ProtocolViolation(format!(
                "expected a query inside the transaction, got '{}'",
                message.code()
            )));
        }

        self.send(&message).await?;
        self.flush().await
    }

    /// Stream COPY data from the client to the server.
    async fn copy_in(&mut self, session: &mut dyn Session, response: Message) -> Result<(), Error> {
        match self.copy_from_client(session, response).await {
            Err(err) if !err.evicts() => {
                self.copy_fail(&err.to_string()).await?;
                Err(err)
            }
            result => result,
        }
    }

    async fn copy_from_client(
        &mut self,
        session: &mut dyn Session,
        response: Message,
    ) -> Result<(), Error> {
        session.send(response).await.map_err(Error::canceled)?;
        session.flush().await.map_err(Error::canceled)?;

        loop {
            let message = match timeout(self.copy_timeout, session.recv()).await {
                Ok(message) => message.map_err(Error::canceled)?,
                Err(_) => return Err(Error::Timeout(self.copy_timeout)),
            };

            match message.code() {
                // CopyData
                'd' => self.send(&message).await?,
                // CopyDone, CopyFail
                'c' | 'f' => {
                    self.send(&message).await?;
                    return self.flush().await;
                }
                // Flush and Sync are ignored during COPY.
                'H' | 'S' => (),
                code => {
                    return Err(Error::ProtocolViolation(format!(
                        "unexpected message '{}' during COPY",
                        code
                    )))
                }
            }
        }
    }

    async fn copy_fail(&mut self, reason: &str) -> Result<(), Error> {
        self.send(&CopyFail::new(reason)).await?;
        self.flush().await
    }

    /// Bring the connection back to idle after an interrupted request.
    /// The connection is closed if that's not possible.
    pub async fn stabilize(&mut self) -> Result<(), Error> {
        let result = self.try_stabilize().await;
        if result.is_err() {
            self.state = State::Closed;
        }
        result
    }

    async fn try_stabilize(&mut self) -> Result<(), Error> {
        for _ in 0..STABILIZE_ATTEMPTS {
            match self.state {
                State::Closed | State::New | State::Authenticating => return Err(Error::Closed),
                State::Copying => self.copy_fail("pgrelay: client went away").await?,
                State::AwaitingSync => {
                    self.send(&Sync).await?;
                    self.flush().await?;
                }
                State::Active | State::Idle => self.flush().await?,
            }

            if self.state != State::Idle {
                self.drain().await?;
            }

            if self.status.is_idle() {
                return Ok(());
            }

            debug!("closing open transaction [{}]", self.addr);
            self.send(&Query::new("END")).await?;
            self.flush().await?;
        }

        Err(Error::ProtocolViolation(
            "server did not leave the transaction".into(),
        ))
    }

    /// Run `SELECT 1`, marking the connection unhealthy if it doesn't
    /// come back idle.
    pub async fn healthcheck(&mut self) -> Result<(), Error> {
        let result = self.try_healthcheck().await;
        if let Err(ref err) = result {
            warn!("health check failed: {} [{}]", err, self.addr);
            self.healthy = false;
        }
        result
    }

    async fn try_healthcheck(&mut self) -> Result<(), Error> {
        if self.state != State::Idle {
            return Err(Error::ProtocolViolation(format!(
                "server is {}",
                self.state
            )));
        }

        self.send(&Query::new("SELECT 1")).await?;
        self.flush().await?;

        loop {
            let message = self.read().await?;
            match message.code() {
                'T' | 'D' | 'C' => (),
                'Z' if self.status.is_idle() => return Ok(()),
                'Z' => {
                    return Err(Error::ProtocolViolation(
                        "server is inside a transaction".into(),
                    ))
                }
                code => return Err(Error::UnexpectedMessage(code)),
            }
        }
    }

    /// Reserve the connection for a client.
    pub fn bind(&mut self, client: BackendKeyData) -> Result<(), Error> {
        match self.client {
            Some(bound) if bound != client => Err(Error::AlreadyBound(bound)),
            _ => {
                self.client = Some(client);
                Ok(())
            }
        }
    }

    /// Release the connection from its client.
    pub fn unbind(&mut self) {
        self.client = None;
    }

    /// Client using this connection.
    pub fn client(&self) -> Option<BackendKeyData> {
        self.client
    }

    /// Connection can go back into the pool as-is.
    pub fn can_check_in(&self) -> bool {
        self.healthy && self.state == State::Idle && self.status.is_idle()
    }

    /// Connection is mid-request or inside a transaction,
    /// but could still be recovered.
    pub fn needs_stabilize(&self) -> bool {
        self.state != State::Closed && !self.can_check_in() && self.healthy
    }

    /// Don't reuse this connection.
    pub fn close(&mut self) {
        self.state = State::Closed;
    }

    /// Ask the server to close the connection.
    pub async fn terminate(&mut self) -> Result<(), Error> {
        self.send(&Terminate).await?;
        self.flush().await
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Last ReadyForQuery received.
    pub fn status(&self) -> ReadyForQuery {
        self.status
    }

    pub fn healthy(&self) -> bool {
        self.healthy
    }

    /// Server parameters.
    pub fn params(&self) -> &[ParameterStatus] {
        &self.params
    }

    /// Key the server gave us, for cancelling queries.
    pub fn id(&self) -> BackendKeyData {
        self.id
    }

    pub fn addr(&self) -> &Address {
        &self.addr
    }

    /// Statement cached on this connection.
    pub fn cached_statement(&self, name: &str) -> Option<&Parse> {
        self.statements.get(name)
    }

    /// Portal cached on this connection.
    pub fn cached_portal(&self, name: &str) -> Option<&Bind> {
        self.portals.get(name)
    }

    /// How long ago the connection was opened.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// How long since the server sent anything.
    pub fn idle_for(&self) -> Duration {
        self.last_used.elapsed()
    }
}
