//! Poolers: how client requests are matched with server connections.
//!
//! In transaction mode, a server connection is bound to the client for one
//! request and goes back to the pool after. In session mode, the client keeps
//! the same server connection until it disconnects.

pub mod session;
pub mod transaction;

pub use session::SessionPool;
pub use transaction::TransactionPool;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::warn;

use crate::config::{General, PoolConfig, PoolerMode, Role, ShardConfig, User};
use crate::frontend::router::{QueryRouter, Sharding};
use crate::frontend::session::Routing;
use crate::frontend::{comms::Link, Session};
use crate::net::messages::{
    BackendKeyData, Describe, Execute, FunctionCall, ParameterStatus, ReadyForQuery,
};
use crate::net::Parameter;

use super::{pool, Error, Request, Server, Shard};

/// Everything a pooler needs to know about its database and user.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Database name clients connect to.
    pub database: String,
    /// User name clients connect with.
    pub user_name: String,
    pub user: User,
    pub mode: PoolerMode,
    pub pool_size: usize,
    pub shards: Vec<ShardConfig>,
    pub query_parser_enabled: bool,
    pub primary_reads_enabled: bool,
    pub sharding: Sharding,
    /// Connection pool settings for each server.
    pub pool: pool::Config,
    /// Startup parameters sent to servers.
    pub params: Vec<Parameter>,
}

impl Settings {
    pub fn new(
        database: &str,
        user_name: &str,
        user: &User,
        config: &PoolConfig,
        general: &General,
    ) -> Self {
        let sharding = config.sharding_function.parse().unwrap_or_else(|err| {
            warn!("{}, using the default", err);
            Sharding::default()
        });
        let pool_size = user.pool_size(general.pool_size);

        Self {
            database: database.to_owned(),
            user_name: user_name.to_owned(),
            user: user.clone(),
            mode: config.pool_mode(general.pool_mode),
            pool_size,
            shards: config.shards.clone(),
            query_parser_enabled: config.query_parser_enabled,
            primary_reads_enabled: config.primary_reads_enabled,
            sharding,
            pool: pool::Config::new(general, pool_size),
            params: vec![Parameter::from(("application_name", "pgrelay"))],
        }
    }

    pub fn router(&self) -> QueryRouter {
        QueryRouter::new(self.query_parser_enabled, self.primary_reads_enabled)
    }

    pub fn statement_timeout(&self) -> Option<Duration> {
        self.user.statement_timeout()
    }

    /// Shard for the next request: the one the client pinned, the one its
    /// sharding key maps to, or any.
    pub fn shard(&self, routing: &Routing) -> usize {
        let shards = self.shards.len().max(1);

        if let Some(shard) = routing.shard {
            shard % shards
        } else if let Some(ref key) = routing.sharding_key {
            self.sharding.shard(key, shards)
        } else if shards == 1 {
            0
        } else {
            rand::rng().random_range(0..shards)
        }
    }

    /// Server role the request needs.
    ///
    /// Extended protocol requests don't carry the query, so they use the role
    /// recorded when the statement was parsed, or the primary if there is none.
    pub fn role(&self, session: &dyn Session, request: &Request<'_>) -> Role {
        if let Some(role) = session.routing().role {
            return role;
        }

        let statement_role =
            |name: Option<&str>| name.and_then(|name| session.statement_role(name));

        let role = match request {
            Request::SimpleQuery(query) | Request::Transaction(query) => {
                Some(self.router().infer_role(query))
            }
            Request::Describe(describe) => {
                if describe.is_statement() {
                    statement_role(Some(describe.name.as_str()))
                } else {
                    statement_role(
                        session
                            .portal(&describe.name)
                            .map(|bind| bind.statement.as_str()),
                    )
                }
            }
            Request::Execute(execute) => statement_role(
                session
                    .portal(&execute.portal)
                    .map(|bind| bind.statement.as_str()),
            ),
            Request::CallFunction(_) => Some(Role::Primary),
        };

        role.unwrap_or(Role::Primary)
    }

    /// Reads can go to the primary when the shard has no replicas.
    pub fn primary_reads(&self, routing: &Routing) -> bool {
        routing.primary_reads.unwrap_or(self.primary_reads_enabled)
    }

    /// Changing these needs a new pooler.
    pub fn needs_restart(&self, other: &Settings) -> bool {
        self.mode != other.mode || self.pool_size != other.pool_size
    }
}

/// Runs client requests on server connections.
#[async_trait]
pub trait Pooler: Send + Sync + std::fmt::Debug {
    /// Run the request on a server connection.
    async fn dispatch(
        &self,
        session: &mut dyn Session,
        request: Request<'_>,
    ) -> Result<ReadyForQuery, Error>;

    async fn describe(
        &self,
        session: &mut dyn Session,
        describe: &Describe,
    ) -> Result<ReadyForQuery, Error> {
        self.dispatch(session, Request::Describe(describe)).await
    }

    async fn execute(
        &self,
        session: &mut dyn Session,
        execute: &Execute,
    ) -> Result<ReadyForQuery, Error> {
        self.dispatch(session, Request::Execute(execute)).await
    }

    async fn simple_query(
        &self,
        session: &mut dyn Session,
        query: &str,
    ) -> Result<ReadyForQuery, Error> {
        self.dispatch(session, Request::SimpleQuery(query)).await
    }

    async fn transaction(
        &self,
        session: &mut dyn Session,
        query: &str,
    ) -> Result<ReadyForQuery, Error> {
        self.dispatch(session, Request::Transaction(query)).await
    }

    async fn call_function(
        &self,
        session: &mut dyn Session,
        call: &FunctionCall,
    ) -> Result<ReadyForQuery, Error> {
        self.dispatch(session, Request::CallFunction(call)).await
    }

    /// Parameters the servers reported at startup. Clients get these
    /// as their own ParameterStatus messages.
    async fn server_info(&self) -> Result<Vec<ParameterStatus>, Error>;

    /// The client is gone.
    fn on_disconnect(&self, id: &BackendKeyData);

    fn settings(&self) -> Arc<Settings>;

    /// Apply new settings. Shards whose servers changed are reconnected.
    fn reconfigure(&self, settings: Settings);

    /// Close all connections.
    fn shutdown(&self);
}

/// Create a pooler for the mode in the settings.
pub fn new_pooler(settings: Settings) -> Result<Arc<dyn Pooler>, Error> {
    Ok(match settings.mode {
        PoolerMode::Transaction => Arc::new(TransactionPool::new(settings)),
        PoolerMode::Session => Arc::new(SessionPool::new(settings)?),
    })
}

/// Bind the server to the client, run the request and unbind.
pub(crate) async fn execute(
    server: &mut Server,
    session: &mut dyn Session,
    request: &Request<'_>,
) -> Result<ReadyForQuery, Error> {
    server.bind(session.id())?;
    session.link(Some(Link::new(server.addr(), server.id())));

    let result = server.handle(session, request).await;

    session.link(None);
    server.unbind();

    result
}

/// The request was abandoned mid-flight: ask the server to stop working on it.
pub(crate) fn cancel_abandoned(session: &mut dyn Session) {
    if let Some(link) = session.linked() {
        session.link(None);
        tokio::spawn(async move {
            if let Err(err) = Server::cancel(&link.addr, &link.id).await {
                warn!("failed to cancel abandoned query [{}]: {}", link.addr, err);
            }
        });
    }
}

/// Create shards for the settings, keeping the ones that didn't change.
pub(crate) fn shards(
    settings: &Settings,
    pool: pool::Config,
    previous: &[Shard],
) -> Result<Vec<Shard>, pool::Error> {
    settings
        .shards
        .iter()
        .enumerate()
        .map(|(number, config)| match previous.get(number) {
            Some(shard) if shard.matches(config) && shard.primary().config() == &pool => {
                Ok(shard.clone())
            }
            _ => Shard::new(number, config, pool, settings.params.clone()),
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::backend::pool::test::{config, mock::MockServer, shard_config};
    use crate::config::UserRole;
    use crate::frontend::session::test::TestSession;
    use crate::net::messages::{Bind, Parse};

    /// Settings for a pool in front of these mock servers, one shard each.
    pub(crate) fn settings(mode: PoolerMode, pool_size: usize, primaries: &[&MockServer]) -> Settings {
        Settings {
            database: "pgrelay".into(),
            user_name: "pgrelay".into(),
            user: User::new("pgrelay"),
            mode,
            pool_size,
            shards: primaries.iter().map(|mock| shard_config(mock, &[])).collect(),
            query_parser_enabled: true,
            primary_reads_enabled: true,
            sharding: Sharding::Hash,
            pool: config(pool_size),
            params: vec![],
        }
    }

    #[tokio::test]
    async fn test_role() {
        let mock = MockServer::start().await;
        let settings = settings(PoolerMode::Transaction, 1, &[&mock]);
        let mut session = TestSession::new();

        assert_eq!(
            settings.role(&session, &Request::SimpleQuery("SELECT 1")),
            Role::Replica
        );
        assert_eq!(
            settings.role(&session, &Request::SimpleQuery("DELETE FROM t")),
            Role::Primary
        );

        session.parse(Parse::named("read", "SELECT 1"), Role::Replica);
        session.bind(Bind::new("p", "read", vec![]));
        assert_eq!(
            settings.role(&session, &Request::Execute(&Execute::new("p"))),
            Role::Replica
        );
        assert_eq!(
            settings.role(&session, &Request::Describe(&Describe::new_statement("read"))),
            Role::Replica
        );

        // Nothing recorded for this one.
        assert_eq!(
            settings.role(&session, &Request::Execute(&Execute::new("unknown"))),
            Role::Primary
        );

        session.routing.role = Some(Role::Primary);
        assert_eq!(
            settings.role(&session, &Request::SimpleQuery("SELECT 1")),
            Role::Primary
        );
    }

    #[tokio::test]
    async fn test_shard() {
        let a = MockServer::start().await;
        let b = MockServer::start().await;
        let settings = settings(PoolerMode::Transaction, 1, &[&a, &b]);

        let mut routing = Routing {
            shard: Some(3),
            ..Default::default()
        };
        assert_eq!(settings.shard(&routing), 1);

        routing.shard = None;
        routing.sharding_key = Some("7".into());
        assert_eq!(settings.shard(&routing), Sharding::Hash.shard("7", 2));

        routing.sharding_key = None;
        assert!(settings.shard(&routing) < 2);
    }

    #[test]
    fn test_settings_from_config() {
        let general = General::default();
        let config = PoolConfig {
            sharding_function: "modulo".into(),
            ..Default::default()
        };
        let mut user = User::new("secret");
        user.role = UserRole::Reader;
        user.pool_size = Some(3);

        let settings = Settings::new("app", "alice", &user, &config, &general);
        assert_eq!(settings.sharding, Sharding::Modulo);
        assert_eq!(settings.pool_size, 3);
        assert_eq!(settings.pool.max, 3);
        assert_eq!(settings.mode, general.pool_mode);
    }
}
