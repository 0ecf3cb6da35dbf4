//! Dialect adapters for schema extraction.
//!
//! Each supported source dialect implements [`DialectAdapter`]: five list
//! operations, one per object class, each backed by a single bulk catalog
//! query whose per-object children come back packed as JSON text. The set of
//! dialects is closed, so callers hold a [`ConnectionHandle`] and dispatch by
//! match instead of through a trait object.
//!
//! # Module Structure
//! - `packed`: decoding of the JSON child payloads shared by every dialect
//! - Dialect modules (`mysql`, `postgres`, `mssql`), each behind its feature
//!
//! # Security Guarantees
//! - Only catalog reads are issued; MySQL and PostgreSQL sessions are forced read-only
//! - Credentials only live inside the driver's connect options and never
//!   reach a handle's `Debug` output or any log line
//! - Every catalog query is bounded by the configured query timeout

pub(crate) mod packed;

#[cfg(feature = "mssql")]
pub mod mssql;
#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgresql")]
pub mod postgres;

use crate::config::SourceConfig;
use crate::error::{Result, SchemaDocError};
use crate::models::{Dialect, RoutineRecord, TableRecord, TriggerRecord, ViewRecord};
use crate::security::{Credentials, parse_connection_string};
use async_trait::async_trait;

/// Uniform extraction interface over one source connection.
///
/// Every list operation either returns the complete class or fails as a
/// whole; there are no partial results. A failure that leaves the
/// connection unusable is reported as [`SchemaDocError::Connection`], any
/// other query failure as [`SchemaDocError::Extraction`].
#[async_trait]
pub trait DialectAdapter: Send + Sync {
    /// Dialect this adapter speaks
    fn dialect(&self) -> Dialect;

    /// Base tables with columns, indexes and foreign keys.
    async fn list_tables(&self) -> Result<Vec<TableRecord>>;

    /// Views with definitions and output columns.
    async fn list_views(&self) -> Result<Vec<ViewRecord>>;

    /// Functions with parameters.
    async fn list_functions(&self) -> Result<Vec<RoutineRecord>>;

    /// Stored procedures with parameters.
    async fn list_procedures(&self) -> Result<Vec<RoutineRecord>>;

    /// Triggers with timing and events.
    async fn list_triggers(&self) -> Result<Vec<TriggerRecord>>;
}

/// Open source connection, tagged by dialect.
#[derive(Debug)]
pub enum ConnectionHandle {
    #[cfg(feature = "mysql")]
    MySql(mysql::MySqlAdapter),
    #[cfg(feature = "postgresql")]
    Postgres(postgres::PostgresAdapter),
    #[cfg(feature = "mssql")]
    Mssql(mssql::MssqlAdapter),
}

/// Expands to a match over every compiled-in handle variant.
macro_rules! dispatch {
    ($handle:expr, $adapter:ident => $body:expr) => {
        match $handle {
            #[cfg(feature = "mysql")]
            ConnectionHandle::MySql($adapter) => $body,
            #[cfg(feature = "postgresql")]
            ConnectionHandle::Postgres($adapter) => $body,
            #[cfg(feature = "mssql")]
            ConnectionHandle::Mssql($adapter) => $body,
        }
    };
}

impl ConnectionHandle {
    /// Runs a trivial query to prove the connection works.
    ///
    /// # Errors
    /// Returns a connection error if the source does not answer
    pub async fn test_connection(&self) -> Result<()> {
        dispatch!(self, adapter => adapter.test_connection().await)
    }

    /// Closes the underlying connection or pool.
    pub async fn release(self) {
        dispatch!(self, adapter => adapter.close().await);
    }
}

#[async_trait]
impl DialectAdapter for ConnectionHandle {
    fn dialect(&self) -> Dialect {
        dispatch!(self, adapter => adapter.dialect())
    }

    async fn list_tables(&self) -> Result<Vec<TableRecord>> {
        dispatch!(self, adapter => adapter.list_tables().await)
    }

    async fn list_views(&self) -> Result<Vec<ViewRecord>> {
        dispatch!(self, adapter => adapter.list_views().await)
    }

    async fn list_functions(&self) -> Result<Vec<RoutineRecord>> {
        dispatch!(self, adapter => adapter.list_functions().await)
    }

    async fn list_procedures(&self) -> Result<Vec<RoutineRecord>> {
        dispatch!(self, adapter => adapter.list_procedures().await)
    }

    async fn list_triggers(&self) -> Result<Vec<TriggerRecord>> {
        dispatch!(self, adapter => adapter.list_triggers().await)
    }
}

/// Opens a connection to the source described by `config`.
///
/// The connection is verified with a trivial query before it is returned.
///
/// # Errors
/// Returns error if:
/// - The configuration is invalid
/// - The dialect was not compiled in
/// - The source cannot be reached or rejects the credentials
pub async fn connect(config: &SourceConfig, credentials: &Credentials) -> Result<ConnectionHandle> {
    config.validate()?;

    let handle = match config.dialect {
        Dialect::Mysql => {
            #[cfg(feature = "mysql")]
            {
                ConnectionHandle::MySql(mysql::MySqlAdapter::connect(config, credentials).await?)
            }
            #[cfg(not(feature = "mysql"))]
            {
                return Err(SchemaDocError::unsupported_feature(
                    "MySQL adapter",
                    "Compile with --features mysql to enable MySQL support",
                ));
            }
        }
        Dialect::Pgsql => {
            #[cfg(feature = "postgresql")]
            {
                ConnectionHandle::Postgres(
                    postgres::PostgresAdapter::connect(config, credentials).await?,
                )
            }
            #[cfg(not(feature = "postgresql"))]
            {
                return Err(SchemaDocError::unsupported_feature(
                    "PostgreSQL adapter",
                    "Compile with --features postgresql to enable PostgreSQL support",
                ));
            }
        }
        Dialect::Mssql => {
            #[cfg(feature = "mssql")]
            {
                ConnectionHandle::Mssql(mssql::MssqlAdapter::connect(config, credentials).await?)
            }
            #[cfg(not(feature = "mssql"))]
            {
                return Err(SchemaDocError::unsupported_feature(
                    "SQL Server adapter",
                    "Compile with --features mssql to enable SQL Server support",
                ));
            }
        }
    };

    handle.test_connection().await?;
    tracing::info!(source = %config, "Connected to source database");
    Ok(handle)
}

/// Parses a connection URL and opens a connection to it.
///
/// # Arguments
/// * `connection_string` - Source URL (sanitized in every error and log)
/// * `base` - Defaults for settings the URL does not carry
///
/// # Errors
/// Returns error if the URL is invalid or the connection fails
pub async fn connect_url(connection_string: &str, base: &SourceConfig) -> Result<ConnectionHandle> {
    let (config, credentials) = parse_connection_string(connection_string, base)?;
    connect(&config, &credentials).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_rejects_invalid_config() {
        let config = SourceConfig::default().with_port(0);
        let credentials = Credentials::new("docs".to_string(), None);
        let err = connect(&config, &credentials).await.unwrap_err();
        assert!(matches!(err, SchemaDocError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_connect_url_rejects_unknown_scheme() {
        let err = connect_url("oracle://docs@localhost/shop", &SourceConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SchemaDocError::Configuration { .. }));
    }
}
