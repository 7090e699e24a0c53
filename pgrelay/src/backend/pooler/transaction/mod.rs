//! Transaction mode pooler.
//!
//! Requests are handed to workers. There are at most `pool_size` workers,
//! so that's also the most connections any server gets from this pool.

pub mod worker;

pub use worker::Worker;

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;
use tracing::{debug, info};

use super::{cancel_abandoned, Pooler, Settings};
use crate::backend::{pool, Error, Request};
use crate::frontend::Session;
use crate::net::messages::{BackendKeyData, ParameterStatus, ReadyForQuery};

/// Transaction mode pooler.
#[derive(Debug, Clone)]
pub struct TransactionPool {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    settings: RwLock<Arc<Settings>>,
    workers: Mutex<Vec<Worker>>,
    permits: Arc<Semaphore>,
    server_info: Mutex<Option<Vec<ParameterStatus>>>,
    online: AtomicBool,
}

impl TransactionPool {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(Inner {
                permits: Arc::new(Semaphore::new(settings.pool_size.max(1))),
                settings: RwLock::new(Arc::new(settings)),
                workers: Mutex::new(vec![]),
                server_info: Mutex::new(None),
                online: AtomicBool::new(true),
            }),
        }
    }

    /// Get an idle worker or create one, waiting if all of them are busy.
    async fn worker(&self) -> Result<WorkerGuard, Error> {
        let permit = self
            .inner
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| pool::Error::Offline)?;

        let worker = self.inner.workers.lock().pop().unwrap_or_default();

        Ok(WorkerGuard {
            worker: Some(worker),
            inner: self.inner.clone(),
            _permit: permit,
        })
    }

    /// Workers waiting for requests.
    pub fn idle(&self) -> usize {
        self.inner.workers.lock().len()
    }
}

#[async_trait]
impl Pooler for TransactionPool {
    async fn dispatch(
        &self,
        session: &mut dyn Session,
        request: Request<'_>,
    ) -> Result<ReadyForQuery, Error> {
        let settings = self.settings();

        let work = async {
            let mut worker = self.worker().await?;
            worker.handle(&settings, &mut *session, request).await
        };

        match settings.statement_timeout() {
            Some(duration) => match timeout(duration, work).await {
                Ok(result) => result,
                Err(_) => {
                    debug!(
                        "statement timeout of {}ms expired [{}]",
                        duration.as_millis(),
                        session.id()
                    );
                    cancel_abandoned(session);
                    Err(Error::Timeout(duration))
                }
            },
            None => work.await,
        }
    }

    async fn server_info(&self) -> Result<Vec<ParameterStatus>, Error> {
        if let Some(ref params) = *self.inner.server_info.lock() {
            return Ok(params.clone());
        }

        let settings = self.settings();
        let params = self.worker().await?.server_info(&settings).await?;
        *self.inner.server_info.lock() = Some(params.clone());

        Ok(params)
    }

    fn on_disconnect(&self, _id: &BackendKeyData) {}

    fn settings(&self) -> Arc<Settings> {
        self.inner.settings.read().clone()
    }

    fn reconfigure(&self, settings: Settings) {
        // Workers reconnect changed shards on their next request.
        *self.inner.settings.write() = Arc::new(settings);
    }

    fn shutdown(&self) {
        if self.inner.online.swap(false, Ordering::Relaxed) {
            let settings = self.settings();
            info!(
                "shutting down transaction pool for {}/{}",
                settings.user_name, settings.database
            );
        }

        self.inner.permits.close();
        for mut worker in self.inner.workers.lock().drain(..) {
            worker.shutdown();
        }
    }
}

/// Worker checked out for one request.
struct WorkerGuard {
    worker: Option<Worker>,
    inner: Arc<Inner>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for WorkerGuard {
    type Target = Worker;

    fn deref(&self) -> &Self::Target {
        self.worker.as_ref().unwrap()
    }
}

impl DerefMut for WorkerGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.worker.as_mut().unwrap()
    }
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            if self.inner.online.load(Ordering::Relaxed) {
                self.inner.workers.lock().push(worker);
            } else {
                worker.shutdown();
            }
        }
    }
}
