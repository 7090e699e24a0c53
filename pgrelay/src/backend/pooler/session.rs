//! Session mode pooler.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::spawn;
use tokio::time::timeout;
use tracing::{debug, error, info};

use super::{cancel_abandoned, execute, shards, Pooler, Settings};
use crate::backend::{Error, Guard, Request, Shard};
use crate::config::Role;
use crate::frontend::Session;
use crate::net::messages::{BackendKeyData, ParameterStatus, ReadyForQuery};

/// Session mode pooler.
///
/// A client gets a server connection on its first request and keeps it
/// until it disconnects. The connection is then health checked and goes
/// back to the pool.
#[derive(Debug)]
pub struct SessionPool {
    settings: RwLock<Arc<Settings>>,
    shards: RwLock<Vec<Shard>>,
    assigned: Mutex<HashMap<BackendKeyData, Guard>>,
    server_info: Mutex<Option<Vec<ParameterStatus>>>,
}

impl SessionPool {
    pub fn new(settings: Settings) -> Result<Self, Error> {
        let shards = shards(&settings, settings.pool.with_healthcheck(), &[])?;

        Ok(Self {
            settings: RwLock::new(Arc::new(settings)),
            shards: RwLock::new(shards),
            assigned: Mutex::new(HashMap::new()),
            server_info: Mutex::new(None),
        })
    }

    /// Get a server connection for a client that doesn't have one yet.
    async fn assign(&self, number: usize, role: Role, primary_reads: bool) -> Result<Guard, Error> {
        let shard = self.shards.read().get(number).cloned();
        let guard = match shard {
            Some(shard) => shard.choose(role, primary_reads).await?,
            None => None,
        };

        guard.ok_or(Error::NoAvailableServer {
            shard: number,
            role,
        })
    }

    /// Clients holding a server connection.
    pub fn assigned(&self) -> usize {
        self.assigned.lock().len()
    }
}

#[async_trait]
impl Pooler for SessionPool {
    async fn dispatch(
        &self,
        session: &mut dyn Session,
        request: Request<'_>,
    ) -> Result<ReadyForQuery, Error> {
        let settings = self.settings();
        let id = session.id();

        let role = settings.role(session, &request);
        if !settings.user.role.can_use(role) {
            return Err(Error::PermissionDenied(role));
        }

        let assigned = self.assigned.lock().remove(&id);
        let mut guard = match assigned {
            Some(guard) => guard,
            None => {
                let number = settings.shard(session.routing());
                // The connection serves every query the client sends,
                // so it goes to the primary unless the user can't write.
                let role = match session.routing().role {
                    Some(role) => role,
                    None if settings.user.role.can_use(Role::Primary) => Role::Primary,
                    None => Role::Replica,
                };
                let primary_reads = settings.primary_reads(session.routing());

                let guard = self.assign(number, role, primary_reads).await?;
                debug!("client {} assigned to [{}] ({})", id, guard.addr(), role);
                guard
            }
        };

        // The client keeps its connection, transaction blocks need no special care.
        let request = match request {
            Request::Transaction(query) => Request::SimpleQuery(query),
            request => request,
        };

        let result = match settings.statement_timeout() {
            Some(duration) => {
                match timeout(duration, execute(&mut guard, &mut *session, &request)).await {
                    Ok(result) => result,
                    Err(_) => {
                        debug!(
                            "statement timeout of {}ms expired [{}]",
                            duration.as_millis(),
                            id
                        );
                        cancel_abandoned(session);
                        guard.close();
                        return Err(Error::Timeout(duration));
                    }
                }
            }
            None => execute(&mut guard, session, &request).await,
        };

        match result {
            Err(ref err) if err.evicts() => {
                debug!("client {} lost its server connection: {}", id, err);
            }
            _ => {
                self.assigned.lock().insert(id, guard);
            }
        }

        result
    }

    async fn server_info(&self) -> Result<Vec<ParameterStatus>, Error> {
        if let Some(ref params) = *self.server_info.lock() {
            return Ok(params.clone());
        }

        let primary = self
            .shards
            .read()
            .first()
            .map(|shard| shard.primary().clone())
            .ok_or(Error::NoAvailableServer {
                shard: 0,
                role: Role::Primary,
            })?;
        let params = primary.get().await?.params().to_vec();
        *self.server_info.lock() = Some(params.clone());

        Ok(params)
    }

    fn on_disconnect(&self, id: &BackendKeyData) {
        let Some(mut guard) = self.assigned.lock().remove(id) else {
            return;
        };
        let config = *guard.pool().config();

        spawn(async move {
            if guard.needs_stabilize()
                && !matches!(
                    timeout(config.stabilize_timeout, guard.stabilize()).await,
                    Ok(Ok(()))
                )
            {
                error!("server did not recover, closing [{}]", guard.addr());
                guard.close();
            }

            if guard.can_check_in()
                && !matches!(
                    timeout(config.healthcheck_timeout, guard.healthcheck()).await,
                    Ok(Ok(()))
                )
            {
                error!("server failed health check, closing [{}]", guard.addr());
                guard.close();
            }
        });
    }

    fn settings(&self) -> Arc<Settings> {
        self.settings.read().clone()
    }

    fn reconfigure(&self, settings: Settings) {
        let pool = settings.pool.with_healthcheck();
        let previous = self.shards.read().clone();

        match shards(&settings, pool, &previous) {
            Ok(shards) => {
                for (number, shard) in previous.iter().enumerate() {
                    let kept = settings.shards.get(number).is_some_and(|config| {
                        shard.matches(config) && shard.primary().config() == &pool
                    });
                    if !kept {
                        shard.shutdown();
                    }
                }

                *self.shards.write() = shards;
                *self.settings.write() = Arc::new(settings);
            }
            Err(err) => error!("keeping previous configuration: {}", err),
        }
    }

    fn shutdown(&self) {
        let settings = self.settings();
        info!(
            "shutting down session pool for {}/{}",
            settings.user_name, settings.database
        );

        for shard in self.shards.read().iter() {
            shard.shutdown();
        }
        self.assigned.lock().clear();
    }
}
