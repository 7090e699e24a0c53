use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Role of a database server inside a shard.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Primary,
    Replica,
}

impl Role {
    pub fn is_primary(&self) -> bool {
        matches!(self, Self::Primary)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Replica => write!(f, "replica"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "primary" => Ok(Self::Primary),
            "replica" => Ok(Self::Replica),
            _ => Err(format!("Invalid server role: {}", s)),
        }
    }
}

/// What a user is allowed to do.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    #[default]
    Writer,
    Reader,
}

impl UserRole {
    /// Check that the user can send queries to a server with this role.
    pub fn can_use(&self, role: Role) -> bool {
        match self {
            Self::Admin | Self::Writer => true,
            Self::Reader => role == Role::Replica,
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::Writer => write!(f, "writer"),
            Self::Reader => write!(f, "reader"),
        }
    }
}
