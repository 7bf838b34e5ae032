//! Database connection configuration
//!
//! Connection parameters are read from the environment (or flags) and
//! validated into a [`DatabaseConfig`]. `DB_PORT` is mandatory.

use std::time::Duration;

use clap::Args;

use crate::error::{Error, Result};

/// Raw connection parameters as supplied on the command line or environment.
#[derive(Args, Debug, Clone, Default)]
pub struct DatabaseParams {
    /// Database host
    #[arg(long = "db-endpoint", env = "DB_ENDPOINT", default_value = "localhost")]
    pub endpoint: String,

    /// Database port
    #[arg(long = "db-port", env = "DB_PORT")]
    pub port: Option<String>,

    /// Database user
    #[arg(long = "db-user", env = "DB_USER", default_value = "root")]
    pub user: String,

    /// Database password
    #[arg(long = "db-password", env = "DB_PASSWORD", default_value = "", hide_env_values = true)]
    pub password: String,

    /// Database (schema) name
    #[arg(long = "db-name", env = "DB_NAME", default_value = "")]
    pub name: String,

    /// Maximum pooled connections
    #[arg(long = "db-max-connections", env = "DB_MAX_CONNECTIONS", default_value = "10")]
    pub max_connections: u32,

    /// Seconds to wait for a pooled connection
    #[arg(long = "db-acquire-timeout-seconds", env = "DB_ACQUIRE_TIMEOUT_SECONDS", default_value = "10")]
    pub acquire_timeout_seconds: u64,
}

/// Validated connection configuration.
#[derive(Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl DatabaseConfig {
    /// Validate raw parameters.
    pub fn from_params(params: DatabaseParams) -> Result<Self> {
        let raw_port = params
            .port
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| {
                Error::Config("DB_PORT is a mandatory parameter and was not provided".to_string())
            })?;

        let port = raw_port
            .trim()
            .parse::<u16>()
            .map_err(|e| Error::Config(format!("DB_PORT {:?} is not a valid port: {}", raw_port, e)))?;

        if params.max_connections == 0 {
            return Err(Error::Config(
                "DB_MAX_CONNECTIONS must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            host: params.endpoint,
            port,
            user: params.user,
            password: params.password,
            database: params.name,
            max_connections: params.max_connections,
            acquire_timeout: Duration::from_secs(params.acquire_timeout_seconds),
        })
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish()
    }
}
