use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use crate::config::{Config, ConfigAndPath, Error};

/// pgrelay is a PostgreSQL connection pooler with read/write routing and sharding.
#[derive(Parser, Debug)]
#[command(name = "", version = concat!("pgrelay v", env!("CARGO_PKG_VERSION")))]
pub struct Cli {
    /// Path to the configuration file. Default: "pgrelay.toml"
    #[arg(short, long, default_value = "pgrelay.toml")]
    pub config: PathBuf,
    /// Log output format.
    #[arg(short, long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
    /// Subcommand.
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start pgrelay.
    Run,

    /// Check the configuration file for errors.
    Configcheck,
}

/// How log lines are written to stderr.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Confirm that the configuration file exists and is valid.
pub fn config_check(path: &Path) -> Result<Config, Error> {
    if !path.exists() {
        return Err(Error::NotFound(path.display().to_string()));
    }

    let config = ConfigAndPath::load(path)?.config;

    info!(
        "\"{}\" is valid, {} pools configured",
        path.display(),
        config.pools.len()
    );

    Ok(config)
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_parse_args() {
        let cli = Cli::parse_from(["pgrelay", "--config", "other.toml", "configcheck"]);
        assert_eq!(cli.config, PathBuf::from("other.toml"));
        assert_eq!(cli.log_format, LogFormat::Text);
        assert!(matches!(cli.command, Some(Commands::Configcheck)));

        let cli = Cli::parse_from(["pgrelay", "--log-format", "json"]);
        assert_eq!(cli.config, PathBuf::from("pgrelay.toml"));
        assert_eq!(cli.log_format, LogFormat::Json);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_config_check() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[pools.app]

[[pools.app.shards]]
database = "app"

[[pools.app.shards.servers]]
host = "127.0.0.1"
username = "postgres"

[pools.app.users.alice]
password = "secret"
"#
        )
        .unwrap();

        let config = config_check(file.path()).unwrap();
        assert_eq!(config.pools.len(), 1);

        assert!(config_check(Path::new("/nonexistent/pgrelay.toml")).is_err());

        let mut broken = tempfile::NamedTempFile::new().unwrap();
        writeln!(broken, "[general]\nport = \"not a port\"").unwrap();
        assert!(config_check(broken.path()).is_err());
    }
}
