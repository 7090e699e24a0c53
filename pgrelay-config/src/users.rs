use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::roles::UserRole;

/// User allowed to connect to a pool.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct User {
    /// User's password.
    #[serde(default)]
    pub password: String,
    /// What the user is allowed to do.
    #[serde(default)]
    pub role: UserRole,
    /// Overrides `general.pool_size`.
    pub pool_size: Option<usize>,
    /// Statement timeout, in milliseconds. Zero disables it.
    #[serde(default)]
    pub statement_timeout: u64,
}

impl User {
    /// New user with a password and default settings.
    pub fn new(password: &str) -> Self {
        Self {
            password: password.to_owned(),
            ..Default::default()
        }
    }

    pub fn pool_size(&self, default: usize) -> usize {
        self.pool_size.unwrap_or(default).max(1)
    }

    pub fn statement_timeout(&self) -> Option<Duration> {
        if self.statement_timeout == 0 {
            None
        } else {
            Some(Duration::from_millis(self.statement_timeout))
        }
    }
}
