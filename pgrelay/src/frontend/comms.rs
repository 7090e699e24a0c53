//! Registry of connected clients.
//!
//! Cancel requests arrive on a separate connection and only carry
//! the client's [`BackendKeyData`]. The registry finds the server
//! connection the client is using right now.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

use crate::backend::{pool::Address, Error, Server};
use crate::net::messages::BackendKeyData;

type Slot = Mutex<Option<Link>>;

static CLIENTS: Lazy<DashMap<BackendKeyData, Weak<Slot>>> = Lazy::new(DashMap::new);
static SHUTDOWN: Lazy<watch::Sender<bool>> = Lazy::new(|| watch::channel(false).0);

/// Server connection executing for a client.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    /// Server address.
    pub addr: Address,
    /// Key the server gave us at startup.
    pub id: BackendKeyData,
}

impl Link {
    pub fn new(addr: &Address, id: BackendKeyData) -> Self {
        Self {
            addr: addr.clone(),
            id,
        }
    }
}

/// Client's entry in the registry. Removed when dropped.
#[derive(Debug)]
pub struct Comms {
    id: BackendKeyData,
    slot: Arc<Slot>,
}

impl Comms {
    /// Register a new client.
    pub fn register(id: BackendKeyData) -> Self {
        let slot = Arc::new(Mutex::new(None));
        CLIENTS.insert(id, Arc::downgrade(&slot));

        Self { id, slot }
    }

    /// Record the server connection the client is using.
    pub fn link(&self, link: Option<Link>) {
        *self.slot.lock() = link;
    }

    /// Server connection the client is using.
    pub fn linked(&self) -> Option<Link> {
        self.slot.lock().clone()
    }

    pub fn id(&self) -> BackendKeyData {
        self.id
    }
}

impl Drop for Comms {
    fn drop(&mut self) {
        CLIENTS.remove(&self.id);
    }
}

/// Server connection the client is using, if the client exists.
pub fn lookup(id: &BackendKeyData) -> Option<Link> {
    CLIENTS
        .get(id)
        .and_then(|slot| slot.upgrade())
        .and_then(|slot| slot.lock().clone())
}

/// Number of connected clients.
pub fn clients() -> usize {
    CLIENTS.len()
}

/// Tell clients the pooler is shutting down.
pub fn shutdown() {
    SHUTDOWN.send_replace(true);
}

/// Watch for shutdown.
pub fn shutting_down() -> watch::Receiver<bool> {
    SHUTDOWN.subscribe()
}

/// The pooler is shutting down.
pub fn offline() -> bool {
    *SHUTDOWN.borrow()
}

/// Forward a cancel request to the server executing for this client.
/// Returns false if the client is unknown or idle.
pub async fn cancel(id: &BackendKeyData) -> Result<bool, Error> {
    match lookup(id) {
        Some(link) => {
            debug!("cancelling query for client {} on [{}]", id, link.addr);
            Server::cancel(&link.addr, &link.id).await?;
            Ok(true)
        }
        None => Ok(false),
    }
}
