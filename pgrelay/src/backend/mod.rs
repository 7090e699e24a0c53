//! Backend manages connections to PostgreSQL.

pub mod databases;
pub mod error;
pub mod pool;
pub mod pooler;
pub mod request;
pub mod server;
pub mod server_options;
pub mod state;

pub use error::Error;
pub use pool::{Address, Guard, Pool, Shard};
pub use pooler::{Pooler, SessionPool, Settings, TransactionPool};
pub use request::Request;
pub use server::Server;
pub use server_options::ServerOptions;
pub use state::State;
