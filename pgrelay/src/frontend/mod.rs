//! Frontend manages connections to clients.

pub mod client;
pub mod comms;
pub mod error;
pub mod listener;
pub mod router;
pub mod session;

pub use client::Client;
pub use comms::Comms;
pub use error::Error;
pub use listener::Listener;
pub use session::{Routing, Session};
