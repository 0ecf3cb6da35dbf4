//! Source database connection configuration.

use crate::models::Dialect;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default `group_concat_max_len` applied to MySQL sessions (64 MiB).
pub const DEFAULT_AGGREGATION_LIMIT: u64 = 64 * 1024 * 1024;

/// Default limit for one catalog query, used by source sessions and by the
/// pass that lists each object class.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for a source database connection.
///
/// # Example
/// ```rust
/// use schemadoc_core::{config::SourceConfig, models::Dialect};
///
/// let config = SourceConfig::new(Dialect::Pgsql, "localhost".to_string())
///     .with_port(5432)
///     .with_database("shop".to_string());
///
/// assert!(config.validate().is_ok());
/// assert_eq!(config.effective_port(), 5432);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Source dialect
    pub dialect: Dialect,
    /// Database host address
    pub host: String,
    /// Optional port number; the dialect default is used when absent
    pub port: Option<u16>,
    /// Database to document
    pub database: Option<String>,
    /// Connection timeout duration
    pub connect_timeout: Duration,
    /// Per-query timeout, enforced server side where the dialect allows
    pub query_timeout: Duration,
    /// Maximum number of pooled connections for one pass
    pub max_connections: u32,
    /// Accept the server certificate without validation (SQL Server)
    pub trust_server_certificate: bool,
    /// Session `group_concat_max_len` for MySQL
    pub aggregation_limit: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::Mysql,
            host: "localhost".to_string(),
            port: None,
            database: None,
            connect_timeout: Duration::from_secs(30),
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            max_connections: 2,
            trust_server_certificate: false,
            aggregation_limit: DEFAULT_AGGREGATION_LIMIT,
        }
    }
}

impl std::fmt::Display for SourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}://{}:{}{}",
            self.dialect,
            self.host,
            self.effective_port(),
            self.database
                .as_ref()
                .map_or_else(String::new, |db| format!("/{}", db))
        )
    }
}

impl SourceConfig {
    /// Creates a new source config with defaults.
    pub fn new(dialect: Dialect, host: String) -> Self {
        Self {
            dialect,
            host,
            ..Default::default()
        }
    }

    /// Validates connection parameters.
    ///
    /// # Errors
    /// Returns error if configuration values are invalid
    pub fn validate(&self) -> crate::Result<()> {
        if self.host.is_empty() {
            return Err(crate::error::SchemaDocError::configuration(
                "host cannot be empty",
            ));
        }

        if self.port == Some(0) {
            return Err(crate::error::SchemaDocError::configuration(
                "port must be greater than 0",
            ));
        }

        if self.database.as_deref().is_some_and(str::is_empty) {
            return Err(crate::error::SchemaDocError::configuration(
                "database name cannot be empty",
            ));
        }

        if self.max_connections == 0 || self.max_connections > 16 {
            return Err(crate::error::SchemaDocError::configuration(
                "max_connections must be between 1 and 16",
            ));
        }

        if self.connect_timeout.is_zero() {
            return Err(crate::error::SchemaDocError::configuration(
                "connect_timeout must be greater than 0",
            ));
        }

        if self.query_timeout.is_zero() {
            return Err(crate::error::SchemaDocError::configuration(
                "query_timeout must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Port to connect to, falling back to the dialect default.
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.dialect.default_port())
    }

    /// Builder method to set port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Builder method to set database.
    pub fn with_database(mut self, database: String) -> Self {
        self.database = Some(database);
        self
    }

    /// Builder method to set the per-query timeout.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Builder method to trust the server certificate.
    pub fn with_trusted_certificate(mut self, trust: bool) -> Self {
        self.trust_server_certificate = trust;
        self
    }
}
