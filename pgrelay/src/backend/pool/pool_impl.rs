//! Connection pool.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::backend::{self, Server, ServerOptions};
use crate::net::Parameter;

use super::{Address, Config, Error, Guard};

/// Connection pool for one server.
///
/// Connections are created on demand, up to [`Config::max`]. Callers
/// wait when all of them are checked out.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<Inner>,
}

struct Inner {
    addr: Address,
    config: Config,
    options: ServerOptions,
    idle: Mutex<Vec<Box<Server>>>,
    permits: Arc<Semaphore>,
    online: AtomicBool,
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("addr", &self.inner.addr)
            .finish()
    }
}

impl Pool {
    /// Create new connection pool.
    pub fn new(addr: Address, config: Config, params: Vec<Parameter>) -> Self {
        let options = ServerOptions::new(params, config.copy_timeout);

        Self {
            inner: Arc::new(Inner {
                addr,
                config,
                options,
                idle: Mutex::new(vec![]),
                permits: Arc::new(Semaphore::new(config.max.max(1))),
                online: AtomicBool::new(true),
            }),
        }
    }

    /// Get a connection, waiting if the pool is at capacity.
    pub async fn get(&self) -> Result<Guard, backend::Error> {
        if !self.online() {
            return Err(Error::Offline.into());
        }

        let permit = self
            .inner
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Offline)?;

        while let Some(mut server) = self.take_idle() {
            if self.inner.config.healthcheck {
                let healthy = timeout(
                    self.inner.config.healthcheck_timeout,
                    server.healthcheck(),
                )
                .await;

                if !matches!(healthy, Ok(Ok(()))) {
                    debug!("discarding unhealthy connection [{}]", self.inner.addr);
                    continue;
                }
            }

            return Ok(Guard::new(self.clone(), server, permit));
        }

        let server = match timeout(
            self.inner.config.connect_timeout,
            Server::connect(&self.inner.addr, self.inner.options.clone()),
        )
        .await
        {
            Ok(server) => server?,
            Err(_) => return Err(Error::ConnectTimeout.into()),
        };

        Ok(Guard::new(self.clone(), Box::new(server), permit))
    }

    fn take_idle(&self) -> Option<Box<Server>> {
        self.inner.idle.lock().pop()
    }

    /// Return a connection. It's closed unless it's clean.
    pub(super) fn checkin(&self, mut server: Box<Server>) {
        server.unbind();

        if self.online() && server.can_check_in() {
            self.inner.idle.lock().push(server);
        } else {
            debug!(
                "closing server connection in \"{}\" state [{}]",
                server.state(),
                self.inner.addr
            );
        }
    }

    /// Close idle connections and refuse new requests.
    /// Connections in use are closed when they come back.
    pub fn shutdown(&self) {
        if self.inner.online.swap(false, Ordering::Relaxed) {
            info!("shutting down pool [{}]", self.inner.addr);
        }
        self.inner.permits.close();
        self.inner.idle.lock().clear();
    }

    pub fn online(&self) -> bool {
        self.inner.online.load(Ordering::Relaxed)
    }

    pub fn addr(&self) -> &Address {
        &self.inner.addr
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Connections waiting in the pool.
    pub fn idle(&self) -> usize {
        self.inner.idle.lock().len()
    }

    /// Connections that can be checked out without waiting.
    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use tokio::time::sleep;

    use super::*;
    use crate::backend::pool::test::{mock::MockServer, pool};
    use crate::net::messages::Query;

    #[tokio::test]
    async fn test_reuse() {
        let mock = MockServer::start().await;
        let pool = pool(&mock, 1);

        let id = {
            let guard = pool.get().await.unwrap();
            guard.id()
        };

        assert_eq!(pool.idle(), 1);
        let guard = pool.get().await.unwrap();
        assert_eq!(guard.id(), id);
        assert_eq!(mock.stats().connections.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_capacity() {
        let mock = MockServer::start().await;
        let pool = pool(&mock, 1);

        let guard = pool.get().await.unwrap();
        assert_eq!(pool.available(), 0);
        assert!(timeout(Duration::from_millis(50), pool.get()).await.is_err());

        drop(guard);
        let guard = timeout(Duration::from_millis(500), pool.get())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(guard.state(), backend::State::Idle);
    }

    #[tokio::test]
    async fn test_dirty_connection_is_stabilized() {
        let mock = MockServer::start().await;
        let pool = pool(&mock, 1);

        {
            let mut guard = pool.get().await.unwrap();
            guard.send(&Query::new("BEGIN")).await.unwrap();
            guard.flush().await.unwrap();
        }

        // The permit is held until the connection is clean again.
        let guard = timeout(Duration::from_millis(500), pool.get())
            .await
            .unwrap()
            .unwrap();
        assert!(guard.status().is_idle());
        assert_eq!(mock.stats().connections.load(Ordering::Relaxed), 1);
        assert_eq!(mock.stats().queries(), vec!["BEGIN", "END"]);
    }

    #[tokio::test]
    async fn test_hung_connection_is_closed() {
        let mock = MockServer::start().await;
        let pool = pool(&mock, 1);

        {
            let mut guard = pool.get().await.unwrap();
            guard.send(&Query::new("HANG")).await.unwrap();
            guard.flush().await.unwrap();
        }

        let guard = timeout(Duration::from_secs(1), pool.get())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(mock.stats().connections.load(Ordering::Relaxed), 2);
        drop(guard);
    }

    #[tokio::test]
    async fn test_healthcheck_on_checkout() {
        let mock = MockServer::start().await;
        let pool = Pool::new(
            mock.address(),
            Config {
                max: 1,
                ..Default::default()
            }
            .with_healthcheck(),
            vec![],
        );

        drop(pool.get().await.unwrap());
        mock.disconnect_all();
        sleep(Duration::from_millis(50)).await;

        // The idle connection is dead, a new one is created.
        let guard = pool.get().await.unwrap();
        assert!(guard.healthy());
        assert_eq!(mock.stats().connections.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_shutdown() {
        let mock = MockServer::start().await;
        let pool = pool(&mock, 2);

        let guard = pool.get().await.unwrap();
        pool.shutdown();

        assert!(matches!(
            pool.get().await,
            Err(backend::Error::Pool(Error::Offline))
        ));
        drop(guard);
        assert_eq!(pool.idle(), 0);
    }
}
