//! Layered service configuration: built-in defaults, an optional config file, then
//! `BALANCE_KEEPER__*` environment variables (`__` separates nested keys, e.g.
//! `BALANCE_KEEPER__SERVER__PORT`). `PORT` is honoured as a shortcut for
//! `server.port`.

use config::{ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub name: String,
    /// File the document store is loaded from on connect and written to on close.
    pub snapshot_path: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let mut builder = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 1234)?
            .set_default("server.request_timeout_secs", 60)?
            .set_default("database.name", "finance_db")?
            .set_default("log.format", "json")?;

        if let Ok(config_file) = env::var("CONFIG_FILE") {
            builder = builder.add_source(File::with_name(&config_file).required(false));
        } else {
            builder = builder.add_source(
                File::with_name(&format!("config/{}", environment)).required(false),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix("BALANCE_KEEPER")
                .prefix_separator("__")
                .separator("__"),
        );

        if let Ok(port) = env::var("PORT") {
            builder = builder.set_override("server.port", port)?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port cannot be 0".to_string());
        }
        if self.server.request_timeout_secs == 0 {
            return Err("Request timeout must be at least one second".to_string());
        }
        if self.database.name.trim().is_empty() {
            return Err("Database name is required".to_string());
        }
        Ok(())
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 1234,
                request_timeout_secs: 60,
            },
            database: DatabaseConfig {
                name: "finance_db".to_string(),
                snapshot_path: None,
            },
            log: LogConfig {
                format: LogFormat::Json,
            },
        }
    }
}
