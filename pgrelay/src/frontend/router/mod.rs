//! Query router.
//!
//! Decides which server role a query needs and intercepts the routing
//! commands clients use to pin shards and roles.

pub mod command;
pub mod error;
pub mod lexer;
pub mod sharding;

pub use command::Command;
pub use error::Error;
pub use sharding::Sharding;

use tracing::debug;

use crate::config::Role;
use crate::frontend::Session;
use crate::net::messages::{EmptyQueryResponse, Protocol};

use lexer::{statements, Kind, Lexer};

/// Keywords that can only run on the primary.
const WRITES: &[&str] = &[
    "UPDATE", "DELETE", "INSERT", "DROP", "CREATE", "TRUNCATE", "VACUUM", "ANALYZE",
];

/// Part of a simple query, sent to a server as one request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Block<'a> {
    /// Statements outside a transaction block.
    Simple(&'a str),
    /// `BEGIN` up to and including the statement closing it,
    /// or up to the end of the query if it stays open.
    Transaction(&'a str),
}

/// Query router.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryRouter {
    query_parser_enabled: bool,
    primary_reads_enabled: bool,
}

impl QueryRouter {
    pub fn new(query_parser_enabled: bool, primary_reads_enabled: bool) -> Self {
        Self {
            query_parser_enabled,
            primary_reads_enabled,
        }
    }

    /// Server role the query needs.
    ///
    /// Writes go to the primary, and so does a query that leaves
    /// a transaction block open, since it could write later.
    pub fn infer_role(&self, query: &str) -> Role {
        if !self.query_parser_enabled {
            return Role::Primary;
        }

        let mut depth = 0usize;

        for token in Lexer::new(query) {
            if token.kind != Kind::Word {
                continue;
            }

            if WRITES.iter().any(|write| token.is(write)) {
                return Role::Primary;
            }

            if token.is("BEGIN") || token.is("START") {
                depth += 1;
            } else if depth > 0
                && (token.is("CASE") || token.is("END") || token.is("COMMIT") || token.is("ROLLBACK"))
            {
                // CASE ... END only counts inside a transaction block.
                if token.is("CASE") {
                    depth += 1;
                } else {
                    depth -= 1;
                }
            }
        }

        if depth > 0 {
            Role::Primary
        } else {
            Role::Replica
        }
    }

    /// Handle routing commands and empty queries without a server.
    ///
    /// Returns true if the query was handled. The reply is written to the
    /// session but ReadyForQuery isn't.
    pub async fn try_handle(&self, session: &mut dyn Session, query: &str) -> Result<bool, Error> {
        if statements(query).is_empty() {
            session.send(EmptyQueryResponse.message()?).await?;
            return Ok(true);
        }

        let command = match Command::parse(query)? {
            Some(command) => command,
            None => return Ok(false),
        };

        debug!("routing command: {:?}", command);

        let reply = command.execute(session.routing_mut(), self.primary_reads_enabled)?;
        for message in reply {
            session.send(message).await?;
        }

        Ok(true)
    }
}

/// Split a simple query so transaction blocks run on one server.
pub fn split(query: &str) -> Vec<Block<'_>> {
    let mut blocks = vec![];
    let mut start = 0;
    let mut transaction = false;

    for statement in statements(query) {
        let begin = statement.starts_with(&["begin"])
            || statement.starts_with(&["start", "transaction"]);
        let end = statement.starts_with(&["end"])
            || statement.starts_with(&["commit"])
            || (statement.starts_with(&["rollback"]) && !statement.starts_with(&["rollback", "to"]));

        if begin && !transaction {
            if !query[start..statement.start].trim().is_empty() {
                blocks.push(Block::Simple(&query[start..statement.start]));
            }
            start = statement.start;
            transaction = true;
        } else if end && transaction {
            blocks.push(Block::Transaction(&query[start..statement.end]));
            start = statement.end;
            transaction = false;
        }
    }

    let rest = &query[start..];
    if !statements(rest).is_empty() {
        if transaction {
            blocks.push(Block::Transaction(rest));
        } else {
            blocks.push(Block::Simple(rest));
        }
    }

    blocks
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::frontend::session::test::TestSession;

    #[test]
    fn test_infer_role() {
        let router = QueryRouter::new(true, true);

        assert_eq!(router.infer_role("SELECT * FROM t"), Role::Replica);
        assert_eq!(router.infer_role("UPDATE t SET x=1"), Role::Primary);
        assert_eq!(router.infer_role("BEGIN; SELECT 1"), Role::Primary);
        assert_eq!(router.infer_role("BEGIN; SELECT 1; END"), Role::Replica);
        assert_eq!(router.infer_role("select 1; insert into t values (1)"), Role::Primary);
        assert_eq!(router.infer_role("SELECT 'DELETE' FROM t"), Role::Replica);
    }

    #[test]
    fn test_case_inside_transaction() {
        let router = QueryRouter::new(true, true);

        // CASE ... END doesn't close the transaction.
        assert_eq!(
            router.infer_role("BEGIN; SELECT CASE WHEN x THEN 1 ELSE 2 END FROM t"),
            Role::Primary
        );
        assert_eq!(
            router.infer_role("BEGIN; SELECT CASE WHEN x THEN 1 END FROM t; END"),
            Role::Replica
        );
        assert_eq!(
            router.infer_role("SELECT CASE WHEN x THEN 1 END FROM t"),
            Role::Replica
        );
    }

    #[test]
    fn test_parser_disabled() {
        let router = QueryRouter::new(false, true);
        for query in ["SELECT * FROM t", "UPDATE t SET x=1", "BEGIN; SELECT 1; END", ""] {
            assert_eq!(router.infer_role(query), Role::Primary);
        }
    }

    #[tokio::test]
    async fn test_try_handle() {
        let router = QueryRouter::new(true, true);
        let mut session = TestSession::new();

        assert!(router.try_handle(&mut session, "SET SHARD TO 2").await.unwrap());
        assert_eq!(session.routing.shard, Some(2));
        assert_eq!(session.codes(), vec!['C']);

        assert!(!router.try_handle(&mut session, "SELECT 1").await.unwrap());
        assert_eq!(session.codes(), vec!['C']);

        assert!(router.try_handle(&mut session, "SHOW SHARD").await.unwrap());
        assert_eq!(session.codes(), vec!['C', 'T', 'D', 'C']);
    }

    #[tokio::test]
    async fn test_empty_query() {
        let router = QueryRouter::new(true, true);
        let mut session = TestSession::new();

        assert!(router.try_handle(&mut session, " ; ").await.unwrap());
        assert_eq!(session.codes(), vec!['I']);
    }

    #[test]
    fn test_split() {
        assert_eq!(split("SELECT 1"), vec![Block::Simple("SELECT 1")]);

        let query = "SELECT 1; BEGIN; UPDATE t SET x = 1; COMMIT; SELECT 2";
        assert_eq!(
            split(query),
            vec![
                Block::Simple("SELECT 1; "),
                Block::Transaction("BEGIN; UPDATE t SET x = 1; COMMIT;"),
                Block::Simple(" SELECT 2"),
            ]
        );

        assert_eq!(
            split("BEGIN; SELECT 1"),
            vec![Block::Transaction("BEGIN; SELECT 1")]
        );

        assert_eq!(
            split("START TRANSACTION; ROLLBACK TO SAVEPOINT a; ROLLBACK"),
            vec![Block::Transaction(
                "START TRANSACTION; ROLLBACK TO SAVEPOINT a; ROLLBACK"
            )]
        );
    }
}
