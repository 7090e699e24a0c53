//! Connection guard.

use std::ops::{Deref, DerefMut};

use tokio::spawn;
use tokio::sync::OwnedSemaphorePermit;
use tokio::time::timeout;
use tracing::{debug, error};

use crate::backend::Server;

use super::Pool;

/// Connection checked out of a pool. Goes back when dropped.
pub struct Guard {
    server: Option<Box<Server>>,
    pool: Pool,
    permit: Option<OwnedSemaphorePermit>,
}

impl std::fmt::Debug for Guard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guard")
            .field("addr", self.pool.addr())
            .field("connected", &self.server.is_some())
            .finish()
    }
}

impl Guard {
    /// Create new connection guard.
    pub(super) fn new(pool: Pool, server: Box<Server>, permit: OwnedSemaphorePermit) -> Self {
        Self {
            server: Some(server),
            pool,
            permit: Some(permit),
        }
    }

    /// Pool this connection belongs to.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Bring the connection back to idle, if needed, and check it
    /// back into the pool. The pool slot stays taken until then.
    fn cleanup(&mut self) {
        let server = self.server.take();
        let permit = self.permit.take();
        let pool = self.pool.clone();

        if let Some(mut server) = server {
            server.unbind();

            if server.needs_stabilize() {
                let stabilize_timeout = pool.config().stabilize_timeout;

                spawn(async move {
                    match timeout(stabilize_timeout, server.stabilize()).await {
                        Ok(Ok(())) => debug!("server stabilized [{}]", server.addr()),
                        Ok(Err(err)) => {
                            error!("server stabilization failed: {} [{}]", err, server.addr())
                        }
                        Err(_) => {
                            error!("server stabilization timed out [{}]", server.addr());
                            server.close();
                        }
                    }

                    pool.checkin(server);
                    drop(permit);
                });
            } else {
                pool.checkin(server);
                drop(permit);
            }
        }
    }
}

impl Deref for Guard {
    type Target = Server;

    fn deref(&self) -> &Self::Target {
        self.server.as_ref().unwrap()
    }
}

impl DerefMut for Guard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.server.as_mut().unwrap()
    }
}

impl Drop for Guard {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use tokio::time::sleep;

    use crate::backend::pool::test::{mock::MockServer, pool};
    use crate::backend::State;
    use crate::net::messages::{Describe, Parse};

    #[tokio::test]
    async fn test_awaiting_sync_is_recovered() {
        let mock = MockServer::start().await;
        let pool = pool(&mock, 1);

        {
            let mut guard = pool.get().await.unwrap();
            guard.ensure_statement(&Parse::named("s1", "SELECT 1")).await.unwrap();
            guard.send(&Describe::new_statement("s1")).await.unwrap();
            assert_eq!(guard.state(), State::AwaitingSync);
        }

        sleep(Duration::from_millis(100)).await;
        assert_eq!(pool.idle(), 1);

        let guard = pool.get().await.unwrap();
        assert_eq!(guard.state(), State::Idle);
        // The statement survived.
        assert!(guard.cached_statement("s1").is_some());
    }

    #[tokio::test]
    async fn test_unbind_on_drop() {
        let mock = MockServer::start().await;
        let pool = pool(&mock, 1);

        {
            let mut guard = pool.get().await.unwrap();
            guard.bind(crate::net::BackendKeyData::new()).unwrap();
        }

        let guard = pool.get().await.unwrap();
        assert!(guard.client().is_none());
    }
}
