use std::time::Duration;

use crate::net::Parameter;

/// Settings for a new server connection.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Startup parameters forwarded from the client.
    pub params: Vec<Parameter>,
    /// How long COPY waits for the next message from the client.
    pub copy_timeout: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            params: vec![],
            copy_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerOptions {
    pub fn new(params: Vec<Parameter>, copy_timeout: Duration) -> Self {
        Self {
            params,
            copy_timeout,
        }
    }
}
