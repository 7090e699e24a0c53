//! Unit of work handed to a pool.

use crate::net::messages::{Describe, Execute, FunctionCall};

/// A client request that needs a server connection.
#[derive(Debug, Clone, Copy)]
pub enum Request<'a> {
    /// Describe a statement or portal, followed by Sync.
    Describe(&'a Describe),
    /// Execute a portal, followed by Sync.
    Execute(&'a Execute),
    /// One simple query.
    SimpleQuery(&'a str),
    /// A simple query opening a transaction block. The connection stays
    /// with the client until the block is closed.
    Transaction(&'a str),
    /// FunctionCall.
    CallFunction(&'a FunctionCall),
}

impl Request<'_> {
    /// Query text, for simple queries.
    pub fn query(&self) -> Option<&str> {
        match self {
            Request::SimpleQuery(query) | Request::Transaction(query) => Some(*query),
            _ => None,
        }
    }
}
