//! Configuration module for the pcc server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::ffi::OsString;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// What the connection handler does when shutdown interrupts a payload read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InterruptPolicy {
    /// Count the bytes that already arrived and answer with that count.
    #[default]
    Drain,
    /// Drop the connection without answering or counting.
    Abandon,
}

/// Command-line arguments for the counting server
#[derive(Parser, Debug)]
#[command(name = "pcc-server")]
#[command(version)]
#[command(about = "Counts printable characters sent over TCP", long_about = None)]
pub struct CliArgs {
    /// Port to listen on
    pub port: Option<u16>,

    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (defaults to all interfaces)
    #[arg(long)]
    pub host: Option<String>,

    /// Maximum number of pending connections
    #[arg(long)]
    pub backlog: Option<i32>,

    /// Largest single payload read in bytes
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Mid-payload shutdown behavior
    #[arg(long, value_enum)]
    pub on_interrupt: Option<InterruptPolicy>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: Option<u16>,
    #[serde(default = "default_backlog")]
    pub backlog: i32,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub on_interrupt: InterruptPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: None,
            backlog: default_backlog(),
            chunk_size: default_chunk_size(),
            on_interrupt: InterruptPolicy::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_backlog() -> i32 {
    10
}

fn default_chunk_size() -> usize {
    8 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: SocketAddr,
    pub backlog: i32,
    pub chunk_size: usize,
    pub on_interrupt: InterruptPolicy,
    pub log_level: String,
}

impl Config {
    /// Configuration for binding `addr` with every other setting at its
    /// default.
    pub fn with_listen(listen: SocketAddr) -> Self {
        let defaults = ServerConfig::default();
        Self {
            listen,
            backlog: defaults.backlog,
            chunk_size: defaults.chunk_size,
            on_interrupt: defaults.on_interrupt,
            log_level: default_log_level(),
        }
    }

    /// Load configuration from the process arguments and optional TOML file.
    ///
    /// Help and version requests print and exit with status 0. Any other
    /// argument error is returned as `ConfigError::Usage`.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(std::env::args_os())
    }

    /// Like `load`, with explicit arguments (the first is the program name).
    pub fn load_from<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let cli = match CliArgs::try_parse_from(args) {
            Ok(cli) => cli,
            Err(e) => match e.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                    e.exit()
                }
                _ => return Err(ConfigError::Usage(e.to_string())),
            },
        };

        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    /// Merge CLI args over TOML values.
    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let server = toml_config.server;

        let port = cli.port.or(server.port).ok_or(ConfigError::MissingPort)?;
        let host = cli.host.unwrap_or(server.host);
        let ip: IpAddr = host
            .parse()
            .map_err(|_| ConfigError::InvalidHost(host.clone()))?;

        let chunk_size = cli.chunk_size.unwrap_or(server.chunk_size);
        if chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }

        Ok(Config {
            listen: SocketAddr::new(ip, port),
            backlog: cli.backlog.unwrap_or(server.backlog),
            chunk_size,
            on_interrupt: cli.on_interrupt.unwrap_or(server.on_interrupt),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        })
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    Usage(String),
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    MissingPort,
    InvalidHost(String),
    ZeroChunkSize,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Usage(msg) => write!(f, "{}", msg.trim_end()),
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::MissingPort => {
                write!(f, "No port given: pass <PORT> or set server.port in the config file")
            }
            ConfigError::InvalidHost(host) => write!(f, "Invalid bind address: {host}"),
            ConfigError::ZeroChunkSize => write!(f, "chunk_size must be at least 1"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, None);
        assert_eq!(config.server.backlog, 10);
        assert_eq!(config.server.on_interrupt, InterruptPolicy::Drain);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            host = "127.0.0.1"
            port = 5555
            backlog = 32
            chunk_size = 1024
            on_interrupt = "abandon"

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, Some(5555));
        assert_eq!(config.server.backlog, 32);
        assert_eq!(config.server.chunk_size, 1024);
        assert_eq!(config.server.on_interrupt, InterruptPolicy::Abandon);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_port_argument() {
        let config = Config::load_from(["pcc-server", "5555"]).unwrap();
        assert_eq!(config.listen, "0.0.0.0:5555".parse().unwrap());
        assert_eq!(config.backlog, 10);
        assert_eq!(config.chunk_size, 8 * 1024);
        assert_eq!(config.on_interrupt, InterruptPolicy::Drain);
    }

    #[test]
    fn test_cli_overrides_toml() {
        let cli = CliArgs::try_parse_from([
            "pcc-server",
            "6000",
            "--host",
            "127.0.0.1",
            "--on-interrupt",
            "abandon",
            "--log-level",
            "trace",
        ])
        .unwrap();
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [server]
            port = 5555
            backlog = 3
            [logging]
            level = "warn"
            "#,
        )
        .unwrap();

        let config = Config::merge(cli, toml_config).unwrap();
        assert_eq!(config.listen, "127.0.0.1:6000".parse().unwrap());
        assert_eq!(config.backlog, 3);
        assert_eq!(config.on_interrupt, InterruptPolicy::Abandon);
        assert_eq!(config.log_level, "trace");
    }

    #[test]
    fn test_usage_errors() {
        assert!(matches!(
            Config::load_from(["pcc-server"]),
            Err(ConfigError::MissingPort)
        ));
        assert!(matches!(
            Config::load_from(["pcc-server", "not-a-port"]),
            Err(ConfigError::Usage(_))
        ));
        assert!(matches!(
            Config::load_from(["pcc-server", "70000"]),
            Err(ConfigError::Usage(_))
        ));
        assert!(matches!(
            Config::load_from(["pcc-server", "5555", "--host", "nowhere"]),
            Err(ConfigError::InvalidHost(_))
        ));
        assert!(matches!(
            Config::load_from(["pcc-server", "5555", "--chunk-size", "0"]),
            Err(ConfigError::ZeroChunkSize)
        ));
    }
}
