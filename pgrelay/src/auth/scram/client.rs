//! SCRAM-SHA-256 client, used to log into servers.

use super::{Error, MECHANISM};

use scram::{
    client::{ServerFinal, ServerFirst},
    ScramClient,
};

enum State<'a> {
    Initial(ScramClient<'a>),
    ServerFirst(ServerFirst<'a>),
    ServerFinal(ServerFinal),
    Done,
}

/// SASL exchange driven by the server's Authentication messages:
/// `AuthenticationSASL` calls [`Client::start`], `AuthenticationSASLContinue`
/// and `AuthenticationSASLFinal` each call [`Client::next`].
pub struct Client<'a> {
    state: Option<State<'a>>,
}

impl<'a> Client<'a> {
    /// Create new SCRAM client.
    pub fn new(user: &'a str, password: &'a str) -> Self {
        Self {
            state: Some(State::Initial(ScramClient::new(user, password, None))),
        }
    }

    /// Check the server offers a mechanism we can use.
    pub fn check_mechanisms(mechanisms: &[String]) -> Result<(), Error> {
        if mechanisms.iter().any(|m| m == MECHANISM) {
            Ok(())
        } else {
            Err(Error::UnsupportedMechanism(mechanisms.to_vec()))
        }
    }

    /// Client first message.
    pub fn start(&mut self) -> Result<String, Error> {
        let (scram, client_first) = match self.state.take() {
            Some(State::Initial(scram)) => scram.client_first(),
            _ => return Err(Error::OutOfOrder),
        };
        self.state = Some(State::ServerFirst(scram));
        Ok(client_first)
    }

    /// Handle a server message. Returns the reply, if the exchange expects one.
    /// The server final message is verified and ends the exchange.
    pub fn next(&mut self, message: &str) -> Result<Option<String>, Error> {
        match self.state.take() {
            Some(State::ServerFirst(scram)) => {
                let (scram, client_final) = scram.handle_server_first(message)?.client_final();
                self.state = Some(State::ServerFinal(scram));
                Ok(Some(client_final))
            }
            Some(State::ServerFinal(scram)) => {
                scram.handle_server_final(message)?;
                self.state = Some(State::Done);
                Ok(None)
            }
            _ => Err(Error::OutOfOrder),
        }
    }

    /// The server proved it knows the password.
    pub fn done(&self) -> bool {
        matches!(self.state, Some(State::Done))
    }
}
