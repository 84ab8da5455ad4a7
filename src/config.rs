//! Configuration module for hello-tcp.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "hello-tcp")]
#[command(author = "hello-tcp authors")]
#[command(version = "0.1.0")]
#[command(about = "A minimal TCP greeting client and echo server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: RoleCommand,
}

/// Which side of the connection to run
#[derive(Subcommand, Debug)]
pub enum RoleCommand {
    /// Accept connections and echo received bytes back
    Server {
        /// Address to bind to (e.g., 0.0.0.0:8001)
        #[arg(short = 'l', long)]
        listen: Option<String>,

        /// Number of event loop worker threads (defaults to number of CPU cores)
        #[arg(short = 'w', long)]
        workers: Option<usize>,
    },
    /// Connect, send the greeting and log whatever comes back
    Client {
        /// Address to connect to (e.g., 127.0.0.1:8001)
        #[arg(long)]
        connect: Option<String>,

        /// Number of event loop worker threads (defaults to number of CPU cores)
        #[arg(short = 'w', long)]
        workers: Option<usize>,

        /// Close the connection after this many idle seconds (0 = wait for the server)
        #[arg(short = 'i', long)]
        idle_timeout: Option<u64>,
    },
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Number of worker threads
    pub workers: Option<usize>,
    /// Enable SO_KEEPALIVE on accepted connections
    #[serde(default = "default_true")]
    pub keepalive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            workers: None,
            keepalive: true,
        }
    }
}

/// Client-related configuration
#[derive(Debug, Deserialize)]
pub struct ClientConfig {
    /// Address to connect to
    #[serde(default = "default_connect")]
    pub connect: String,
    /// Number of worker threads
    pub workers: Option<usize>,
    /// Enable TCP_NODELAY on the connection
    #[serde(default = "default_true")]
    pub nodelay: bool,
    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    /// Idle timeout in seconds (0 = wait for the server to close)
    #[serde(default)]
    pub idle_timeout: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect: default_connect(),
            workers: None,
            nodelay: true,
            connect_timeout: default_connect_timeout(),
            idle_timeout: 0,
        }
    }
}

/// Event loop configuration
#[derive(Debug, Deserialize)]
pub struct RuntimeConfig {
    /// Seconds to wait for tasks when shutting the event loop group down
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
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

fn default_listen() -> String {
    "0.0.0.0:8001".to_string()
}

fn default_connect() -> String {
    "127.0.0.1:8001".to_string()
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_shutdown_timeout() -> u64 {
    15
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Resolved server settings
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub listen: String,
    pub workers: Option<usize>,
    pub keepalive: bool,
}

/// Resolved client settings
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub connect: String,
    pub workers: Option<usize>,
    pub nodelay: bool,
    pub connect_timeout: Duration,
    pub idle_timeout: Option<Duration>,
}

/// The role this process plays
#[derive(Debug, Clone)]
pub enum Role {
    Server(ServerSettings),
    Client(ClientSettings),
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub role: Role,
    pub shutdown_timeout: Duration,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Ok(Self::resolve(cli, toml_config))
    }

    /// Merge CLI args with TOML config (CLI takes precedence).
    pub fn resolve(cli: CliArgs, toml_config: TomlConfig) -> Self {
        let role = match cli.command {
            RoleCommand::Server { listen, workers } => Role::Server(ServerSettings {
                listen: listen.unwrap_or(toml_config.server.listen),
                workers: workers.or(toml_config.server.workers),
                keepalive: toml_config.server.keepalive,
            }),
            RoleCommand::Client {
                connect,
                workers,
                idle_timeout,
            } => {
                let idle_secs = idle_timeout.unwrap_or(toml_config.client.idle_timeout);
                Role::Client(ClientSettings {
                    connect: connect.unwrap_or(toml_config.client.connect),
                    workers: workers.or(toml_config.client.workers),
                    nodelay: toml_config.client.nodelay,
                    connect_timeout: Duration::from_secs(toml_config.client.connect_timeout),
                    idle_timeout: (idle_secs > 0).then(|| Duration::from_secs(idle_secs)),
                })
            }
        };

        Config {
            role,
            shutdown_timeout: Duration::from_secs(toml_config.runtime.shutdown_timeout),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        }
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.listen, "0.0.0.0:8001");
        assert!(config.server.keepalive);
        assert_eq!(config.client.connect, "127.0.0.1:8001");
        assert!(config.client.nodelay);
        assert_eq!(config.client.idle_timeout, 0);
        assert_eq!(config.runtime.shutdown_timeout, 15);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            listen = "127.0.0.1:9001"
            workers = 4
            keepalive = false

            [client]
            connect = "10.0.0.1:9001"
            nodelay = false
            connect_timeout = 5
            idle_timeout = 2

            [runtime]
            shutdown_timeout = 3

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:9001");
        assert_eq!(config.server.workers, Some(4));
        assert!(!config.server.keepalive);
        assert_eq!(config.client.connect, "10.0.0.1:9001");
        assert!(!config.client.nodelay);
        assert_eq!(config.client.connect_timeout, 5);
        assert_eq!(config.client.idle_timeout, 2);
        assert_eq!(config.runtime.shutdown_timeout, 3);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: TomlConfig = toml::from_str("[client]\nidle_timeout = 1\n").unwrap();
        assert_eq!(config.client.connect, "127.0.0.1:8001");
        assert_eq!(config.client.connect_timeout, 30);
        assert_eq!(config.server.listen, "0.0.0.0:8001");
    }

    #[test]
    fn test_resolve_server_defaults() {
        let config = Config::resolve(cli(&["hello-tcp", "server"]), TomlConfig::default());
        match config.role {
            Role::Server(settings) => {
                assert_eq!(settings.listen, "0.0.0.0:8001");
                assert_eq!(settings.workers, None);
                assert!(settings.keepalive);
            }
            other => panic!("unexpected role: {:?}", other),
        }
        assert_eq!(config.log_level, "info");
        assert_eq!(config.shutdown_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_cli_overrides_toml() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [client]
            connect = "10.0.0.1:9001"
            workers = 8
            idle_timeout = 9

            [logging]
            level = "warn"
        "#,
        )
        .unwrap();

        let args = cli(&[
            "hello-tcp",
            "--log-level",
            "trace",
            "client",
            "--connect",
            "127.0.0.1:7000",
            "--idle-timeout",
            "0",
        ]);
        let config = Config::resolve(args, toml_config);

        match config.role {
            Role::Client(settings) => {
                assert_eq!(settings.connect, "127.0.0.1:7000");
                assert_eq!(settings.workers, Some(8));
                assert_eq!(settings.idle_timeout, None);
                assert_eq!(settings.connect_timeout, Duration::from_secs(30));
            }
            other => panic!("unexpected role: {:?}", other),
        }
        assert_eq!(config.log_level, "trace");
    }

    #[test]
    fn test_idle_timeout_from_toml() {
        let toml_config: TomlConfig = toml::from_str("[client]\nidle_timeout = 2\n").unwrap();
        let config = Config::resolve(cli(&["hello-tcp", "client"]), toml_config);
        match config.role {
            Role::Client(settings) => {
                assert_eq!(settings.idle_timeout, Some(Duration::from_secs(2)));
            }
            other => panic!("unexpected role: {:?}", other),
        }
    }

    #[test]
    fn test_subcommand_required() {
        assert!(CliArgs::try_parse_from(["hello-tcp"]).is_err());
    }
}
