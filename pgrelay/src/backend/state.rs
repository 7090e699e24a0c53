//! Server connection protocol state.

use std::fmt::Display;

/// Where the server connection is in the protocol exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    /// Socket open, nothing sent yet.
    #[default]
    New,
    /// Startup sent, waiting for AuthenticationOk.
    Authenticating,
    /// ReadyForQuery received; can accept a new request.
    Idle,
    /// Request sent, waiting for ReadyForQuery.
    Active,
    /// Extended protocol messages sent without a Sync.
    AwaitingSync,
    /// Server expects CopyData from us.
    Copying,
    /// Socket failed or was abandoned.
    Closed,
}

impl State {
    /// State after sending a frontend message with this code.
    pub fn sent(self, code: char) -> Self {
        match (self, code) {
            (State::Closed, _) => State::Closed,
            (_, 'X') => State::Closed,
            (State::Copying, 'd') => State::Copying,
            (State::Copying, 'c' | 'f') => State::Active,
            (_, 'Q' | 'F' | 'S') => State::Active,
            (State::Active, 'P' | 'B' | 'D' | 'E' | 'C' | 'H') => State::Active,
            (_, 'P' | 'B' | 'D' | 'E' | 'C' | 'H') => State::AwaitingSync,
            (state, _) => state,
        }
    }

    /// State after receiving a backend message with this code.
    pub fn received(self, code: char) -> Self {
        match code {
            'Z' => State::Idle,
            'G' | 'W' => State::Copying,
            _ => self,
        }
    }
}

impl Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use State::*;
        match self {
            New => write!(f, "new"),
            Authenticating => write!(f, "authenticating"),
            Idle => write!(f, "idle"),
            Active => write!(f, "active"),
            AwaitingSync => write!(f, "awaiting sync"),
            Copying => write!(f, "copying"),
            Closed => write!(f, "closed"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_extended_exchange() {
        let state = State::Idle.sent('P').sent('B').sent('E');
        assert_eq!(state, State::AwaitingSync);
        let state = state.sent('S');
        assert_eq!(state, State::Active);
        assert_eq!(state.received('1').received('Z'), State::Idle);
    }

    #[test]
    fn test_copy_exchange() {
        let state = State::Idle.sent('Q').received('G');
        assert_eq!(state, State::Copying);
        assert_eq!(state.sent('d'), State::Copying);
        assert_eq!(state.sent('c'), State::Active);
        assert_eq!(State::Copying.sent('f'), State::Active);
    }

    #[test]
    fn test_closed_is_terminal() {
        assert_eq!(State::Closed.sent('Q'), State::Closed);
        assert_eq!(State::Idle.sent('X'), State::Closed);
    }
}
