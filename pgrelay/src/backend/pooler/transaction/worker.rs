//! Transaction mode worker.

use tracing::debug;

use crate::backend::pooler::{execute, Settings};
use crate::backend::{pool, Error, Request, Shard};
use crate::config::Role;
use crate::frontend::Session;
use crate::net::messages::{ParameterStatus, ReadyForQuery};

/// Connections to every shard, used by one request at a time.
///
/// Shards are connected on first use. A shard whose configuration
/// changed is dropped and reconnected.
#[derive(Debug, Default)]
pub struct Worker {
    shards: Vec<Option<Shard>>,
}

impl Worker {
    /// Route the request and run it.
    pub async fn handle(
        &mut self,
        settings: &Settings,
        session: &mut dyn Session,
        request: Request<'_>,
    ) -> Result<ReadyForQuery, Error> {
        let number = settings.shard(session.routing());
        let role = settings.role(session, &request);

        if !settings.user.role.can_use(role) {
            return Err(Error::PermissionDenied(role));
        }

        let primary_reads = settings.primary_reads(session.routing());
        let shard = self.shard(number, settings)?;
        let mut guard = shard
            .choose(role, primary_reads)
            .await?
            .ok_or(Error::NoAvailableServer {
                shard: number,
                role,
            })?;

        execute(&mut guard, session, &request).await
    }

    /// Parameters reported by the primary of the first shard.
    pub async fn server_info(
        &mut self,
        settings: &Settings,
    ) -> Result<Vec<ParameterStatus>, Error> {
        let guard = self.shard(0, settings)?.primary().get().await?;
        Ok(guard.params().to_vec())
    }

    fn shard(&mut self, number: usize, settings: &Settings) -> Result<&Shard, Error> {
        let config = settings
            .shards
            .get(number)
            .ok_or(Error::NoAvailableServer {
                shard: number,
                role: Role::Primary,
            })?;
        // Each worker holds at most one connection per server.
        let pool = pool::Config {
            max: 1,
            ..settings.pool
        };

        if self.shards.len() > settings.shards.len() {
            for shard in self.shards.drain(settings.shards.len()..).flatten() {
                shard.shutdown();
            }
        }
        self.shards.resize(settings.shards.len(), None);

        let slot = &mut self.shards[number];
        let shard = match slot.take() {
            Some(shard) if shard.matches(config) && shard.primary().config() == &pool => shard,
            previous => {
                if let Some(previous) = previous {
                    debug!("shard {} changed, reconnecting", number);
                    previous.shutdown();
                }
                Shard::new(number, config, pool, settings.params.clone())?
            }
        };

        Ok(slot.insert(shard))
    }

    /// Close all connections.
    pub fn shutdown(&mut self) {
        for shard in self.shards.drain(..).flatten() {
            shard.shutdown();
        }
    }
}
