//! PostgreSQL connection pool management.

use super::PostgresAdapter;
use crate::Result;
use crate::config::SourceConfig;
use crate::error::SchemaDocError;
use crate::models::{Dialect, ObjectClass};
use crate::security::Credentials;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tokio::sync::OnceCell;

const SERVER_VERSION_QUERY: &str = "SELECT current_setting('server_version_num')";

impl PostgresAdapter {
    /// Creates a PostgreSQL adapter with a lazily connecting pool.
    ///
    /// # Errors
    /// Returns error if the configuration is invalid
    pub async fn connect(config: &SourceConfig, credentials: &Credentials) -> Result<Self> {
        config.validate()?;
        let pool = create_connection_pool(config, credentials);
        Ok(Self {
            pool,
            config: config.clone(),
            server_version: OnceCell::new(),
        })
    }

    /// Opens the first connection and records the server version.
    ///
    /// # Errors
    /// Returns a connection error if the server is unreachable, rejects the
    /// credentials or reports a version that cannot be read
    pub async fn test_connection(&self) -> Result<()> {
        let raw: String = sqlx::query_scalar(SERVER_VERSION_QUERY)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                SchemaDocError::connection_failed(
                    format!("Failed to connect to {}", self.config),
                    e,
                )
            })?;

        let major_version = super::parse_server_version_num(&raw).ok_or_else(|| {
            SchemaDocError::connection_failed(
                format!("Unrecognized server version from {}", self.config),
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("server_version_num '{}'", raw.trim()),
                ),
            )
        })?;

        // A concurrent first read stores the same value
        let _ = self.server_version.set(major_version);
        tracing::debug!(major_version, "Connected to PostgreSQL");
        Ok(())
    }

    /// Server major version, queried on first use when the connection test
    /// did not already record it.
    ///
    /// # Errors
    /// Returns an extraction error for `object_class` if the version cannot
    /// be read
    pub async fn server_major_version(&self, object_class: ObjectClass) -> Result<u32> {
        self.server_version
            .get_or_try_init(|| async {
                let raw: String = sqlx::query_scalar(SERVER_VERSION_QUERY)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(|e| {
                        SchemaDocError::from_catalog_query(Dialect::Pgsql, object_class, e)
                    })?;
                major_version_from_setting(&raw, object_class)
            })
            .await
            .copied()
    }

    /// Closes the connection pool gracefully
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Decodes `server_version_num`; an unrecognized value is an extraction
/// failure rather than a guess.
pub(crate) fn major_version_from_setting(raw: &str, object_class: ObjectClass) -> Result<u32> {
    super::parse_server_version_num(raw).ok_or_else(|| {
        SchemaDocError::decode_failed(
            Dialect::Pgsql,
            object_class,
            format!("unrecognized server_version_num '{}'", raw.trim()),
        )
    })
}

/// Typed connect options; the password never passes through a URL.
pub fn pg_connect_options(config: &SourceConfig, credentials: &Credentials) -> PgConnectOptions {
    let mut options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.effective_port())
        .username(credentials.username())
        .application_name(concat!("schemadoc-sync-", env!("CARGO_PKG_VERSION")));

    if credentials.has_password() {
        options = options.password(credentials.password());
    }
    if let Some(database) = &config.database {
        options = options.database(database);
    }
    options
}

/// Statements every pooled session runs before first use.
pub fn session_statements(config: &SourceConfig) -> Vec<String> {
    vec![
        format!(
            "SET statement_timeout = {}",
            config.query_timeout.as_millis()
        ),
        "SET lock_timeout = '30s'".to_string(),
        "SET default_transaction_read_only = on".to_string(),
        "SET timezone = 'UTC'".to_string(),
    ]
}

fn create_connection_pool(config: &SourceConfig, credentials: &Credentials) -> PgPool {
    use sqlx::Executor;

    let statements = session_statements(config);

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.connect_timeout)
        .test_before_acquire(true)
        .after_connect(move |conn, _meta| {
            let statements = statements.clone();
            Box::pin(async move {
                for statement in &statements {
                    conn.execute(statement.as_str()).await?;
                }
                Ok(())
            })
        })
        .connect_lazy_with(pg_connect_options(config, credentials));

    tracing::debug!(source = %config, "Created PostgreSQL connection pool");
    pool
}
