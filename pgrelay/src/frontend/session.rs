//! What the pool needs from a connected client.

use async_trait::async_trait;

use crate::config::Role;
use crate::net::{
    messages::{BackendKeyData, Bind, Message, Parse},
    Error,
};

use super::comms::Link;

/// Routing state set by the client with router commands.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Routing {
    /// `SET SHARD TO <n>`
    pub shard: Option<usize>,
    /// `SET SHARDING KEY TO <key>`
    pub sharding_key: Option<String>,
    /// `SET SERVER ROLE TO <role>`
    pub role: Option<Role>,
    /// `SET PRIMARY READS TO <on|off>`
    pub primary_reads: Option<bool>,
}

/// Client session, as seen by pools and server connections.
///
/// Extended protocol state (statements and portals) lives here,
/// so the same client can be served by any server connection.
#[async_trait]
pub trait Session: Send {
    /// Identity issued to the client at startup.
    fn id(&self) -> BackendKeyData;


    /// Statement created by Parse.
    fn statement(&self, name: &str) -> Option<&Parse>;

    /// Role inferred when the statement was parsed.
    fn statement_role(&self, name: &str) -> Option<Role>;

    /// Portal created by Bind.
    fn portal(&self, name: &str) -> Option<&Bind>;

    fn routing(&self) -> &Routing;

    fn routing_mut(&mut self) -> &mut Routing;

    /// Record the server connection executing for this client.
    fn link(&mut self, link: Option<Link>);

    /// Server connection executing for this client, if any.
    fn linked(&self) -> Option<Link>;

    /// Send a message to the client. The write is buffered.
    async fn send(&mut self, message: Message) -> Result<(), Error>;

    /// Flush buffered messages to the client.
    async fn flush(&mut self) -> Result<(), Error>;

    /// Next message from the client that needs a server.
    async fn recv(&mut self) -> Result<Message, Error>;
}

#[cfg(test)]
pub(crate) mod test {
    //! In-memory session used by pool and server tests.

    use std::collections::{HashMap, VecDeque};

    use super::*;
    use crate::net::messages::{Protocol, Query};

    #[derive(Debug, Default)]
    pub(crate) struct TestSession {
        pub(crate) id: BackendKeyData,
        pub(crate) statements: HashMap<String, (Parse, Role)>,
        pub(crate) portals: HashMap<String, Bind>,
        pub(crate) routing: Routing,
        pub(crate) link: Option<Link>,
        pub(crate) links: usize,
        pub(crate) sent: Vec<Message>,
        pub(crate) inbox: VecDeque<Message>,
        pub(crate) flushes: usize,
    }

    impl TestSession {
        pub(crate) fn new() -> Self {
            Self {
                id: BackendKeyData::new(),
                ..Default::default()
            }
        }

        pub(crate) fn parse(&mut self, parse: Parse, role: Role) {
            self.statements.insert(parse.name.clone(), (parse, role));
        }

        pub(crate) fn bind(&mut self, bind: Bind) {
            self.portals.insert(bind.portal.clone(), bind);
        }

        pub(crate) fn queue(&mut self, query: &str) {
            if let Ok(message) = Query::new(query).message() {
                self.inbox.push_back(message);
            }
        }

        pub(crate) fn codes(&self) -> Vec<char> {
            self.sent.iter().map(|m| m.code()).collect()
        }
    }

    #[async_trait]
    impl Session for TestSession {
        fn id(&self) -> BackendKeyData {
            self.id
        }

        fn statement(&self, name: &str) -> Option<&Parse> {
            self.statements.get(name).map(|(parse, _)| parse)
        }

        fn statement_role(&self, name: &str) -> Option<Role> {
            self.statements.get(name).map(|(_, role)| *role)
        }

        fn portal(&self, name: &str) -> Option<&Bind> {
            self.portals.get(name)
        }

        fn routing(&self) -> &Routing {
            &self.routing
        }

        fn routing_mut(&mut self) -> &mut Routing {
            &mut self.routing
        }

        fn link(&mut self, link: Option<Link>) {
            if link.is_some() {
                self.links += 1;
            }
            self.link = link;
        }

        fn linked(&self) -> Option<Link> {
            self.link.clone()
        }

        async fn send(&mut self, message: Message) -> Result<(), Error> {
            self.sent.push(message);
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), Error> {
            self.flushes += 1;
            Ok(())
        }

        async fn recv(&mut self) -> Result<Message, Error> {
            self.inbox.pop_front().ok_or(Error::Disconnected)
        }
    }
}
