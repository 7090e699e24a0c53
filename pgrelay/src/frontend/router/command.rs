//! Routing commands clients can send as queries.

use crate::config::Role;
use crate::frontend::session::Routing;
use crate::net::messages::{CommandComplete, DataRow, Field, Message, Protocol, RowDescription};

use super::Error;

/// Routing command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `SET SHARDING KEY TO <key>`
    SetShardingKey(String),
    /// `SET SHARD TO <n|any>`
    SetShard(Option<usize>),
    /// `SHOW SHARD`
    ShowShard,
    /// `SET SERVER ROLE TO <primary|replica|any>`
    SetServerRole(Option<Role>),
    /// `SHOW SERVER ROLE`
    ShowServerRole,
    /// `SET PRIMARY READS TO <on|off>`
    SetPrimaryReads(bool),
    /// `SHOW PRIMARY READS`
    ShowPrimaryReads,
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    SetShardingKey,
    SetShard,
    ShowShard,
    SetServerRole,
    ShowServerRole,
    SetPrimaryReads,
    ShowPrimaryReads,
}

/// Commands, by their leading words.
const COMMANDS: &[(&[&str], Kind)] = &[
    (&["set", "sharding", "key", "to"], Kind::SetShardingKey),
    (&["set", "shard", "to"], Kind::SetShard),
    (&["show", "shard"], Kind::ShowShard),
    (&["set", "server", "role", "to"], Kind::SetServerRole),
    (&["show", "server", "role"], Kind::ShowServerRole),
    (&["set", "primary", "reads", "to"], Kind::SetPrimaryReads),
    (&["show", "primary", "reads"], Kind::ShowPrimaryReads),
];

impl Command {
    /// Parse a routing command. Returns `None` for any other query.
    pub fn parse(query: &str) -> Result<Option<Self>, Error> {
        let query = query.trim().trim_end_matches(';').trim_end();
        let mut words = query.split_whitespace();
        let leading = words.clone().count();

        for (prefix, kind) in COMMANDS {
            if leading < prefix.len()
                || !words
                    .clone()
                    .zip(prefix.iter())
                    .all(|(word, expected)| word.eq_ignore_ascii_case(expected))
            {
                continue;
            }

            let rest = words.by_ref().skip(prefix.len()).collect::<Vec<_>>().join(" ");
            let value = unquote(&rest);

            let command = match kind {
                Kind::ShowShard | Kind::ShowServerRole | Kind::ShowPrimaryReads
                    if !value.is_empty() =>
                {
                    return Ok(None)
                }
                Kind::ShowShard => Self::ShowShard,
                Kind::ShowServerRole => Self::ShowServerRole,
                Kind::ShowPrimaryReads => Self::ShowPrimaryReads,

                Kind::SetShardingKey => {
                    if value.is_empty() {
                        return Err(invalid("sharding key", value));
                    }
                    Self::SetShardingKey(value.to_owned())
                }

                Kind::SetShard => {
                    if value.eq_ignore_ascii_case("any") {
                        Self::SetShard(None)
                    } else {
                        let shard = value
                            .parse::<usize>()
                            .map_err(|_| invalid("shard", value))?;
                        Self::SetShard(Some(shard))
                    }
                }

                Kind::SetServerRole => {
                    if value.eq_ignore_ascii_case("any") {
                        Self::SetServerRole(None)
                    } else {
                        let role = value
                            .parse::<Role>()
                            .map_err(|_| invalid("server role", value))?;
                        Self::SetServerRole(Some(role))
                    }
                }

                Kind::SetPrimaryReads => Self::SetPrimaryReads(
                    parse_bool(value).ok_or_else(|| invalid("primary reads", value))?,
                ),
            };

            return Ok(Some(command));
        }

        Ok(None)
    }

    /// Apply the command to the session and build the reply,
    /// without ReadyForQuery.
    ///
    /// `primary_reads` is the pool default, shown when the session didn't override it.
    pub fn execute(&self, routing: &mut Routing, primary_reads: bool) -> Result<Vec<Message>, Error> {
        let reply = match self {
            Self::SetShardingKey(key) => {
                routing.sharding_key = Some(key.clone());
                set()?
            }
            Self::SetShard(shard) => {
                routing.shard = *shard;
                set()?
            }
            Self::SetServerRole(role) => {
                routing.role = *role;
                set()?
            }
            Self::SetPrimaryReads(enabled) => {
                routing.primary_reads = Some(*enabled);
                set()?
            }

            Self::ShowShard => show(
                "shard",
                &routing
                    .shard
                    .map(|shard| shard.to_string())
                    .unwrap_or_else(|| "any".into()),
            )?,
            Self::ShowServerRole => show(
                "server_role",
                &routing
                    .role
                    .map(|role| role.to_string())
                    .unwrap_or_else(|| "any".into()),
            )?,
            Self::ShowPrimaryReads => show(
                "primary_reads",
                if routing.primary_reads.unwrap_or(primary_reads) {
                    "on"
                } else {
                    "off"
                },
            )?,
        };

        Ok(reply)
    }
}

fn set() -> Result<Vec<Message>, Error> {
    Ok(vec![CommandComplete::new("SET").message()?])
}

fn show(name: &str, value: &str) -> Result<Vec<Message>, Error> {
    let mut row = DataRow::new();
    row.add(value);

    Ok(vec![
        RowDescription::new(&[Field::text(name)]).message()?,
        row.message()?,
        CommandComplete::new("SHOW").message()?,
    ])
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    for quote in ['\'', '"'] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|value| value.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Some(true),
        "off" | "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

fn invalid(setting: &'static str, value: &str) -> Error {
    Error::InvalidValue {
        setting,
        value: value.to_owned(),
    }
}
