//! MySQL connection pool management.

use super::MySqlAdapter;
use crate::Result;
use crate::config::SourceConfig;
use crate::error::SchemaDocError;
use crate::security::Credentials;
use sqlx::MySqlPool;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};

impl MySqlAdapter {
    /// Creates a MySQL adapter with a lazily connecting pool.
    ///
    /// # Errors
    /// Returns error if the configuration is invalid
    pub async fn connect(config: &SourceConfig, credentials: &Credentials) -> Result<Self> {
        config.validate()?;
        let pool = create_mysql_connection_pool(config, credentials);
        Ok(Self {
            pool,
            config: config.clone(),
        })
    }

    /// Runs `SELECT 1` through the pool, opening the first connection.
    ///
    /// # Errors
    /// Returns a connection error if the server is unreachable, rejects the
    /// credentials, or refuses the session settings
    pub async fn test_connection(&self) -> Result<()> {
        let result: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                SchemaDocError::connection_failed(
                    format!("Failed to connect to {}", self.config),
                    e,
                )
            })?;

        if result != 1 {
            return Err(SchemaDocError::configuration(
                "Basic connectivity test failed: unexpected result",
            ));
        }
        Ok(())
    }

    /// Closes the connection pool gracefully
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Typed connect options; the password never passes through a URL.
pub fn mysql_connect_options(
    config: &SourceConfig,
    credentials: &Credentials,
) -> MySqlConnectOptions {
    let mut options = MySqlConnectOptions::new()
        .host(&config.host)
        .port(config.effective_port())
        .username(credentials.username());

    if credentials.has_password() {
        options = options.password(credentials.password());
    }
    if let Some(database) = &config.database {
        options = options.database(database);
    }
    options
}

/// Statements every pooled session runs before first use.
///
/// `group_concat_max_len` must cover the longest index column list; the
/// server default of 1024 bytes silently truncates.
pub fn session_statements(config: &SourceConfig) -> Vec<String> {
    vec![
        format!(
            "SET SESSION max_execution_time = {}",
            config.query_timeout.as_millis()
        ),
        format!(
            "SET SESSION group_concat_max_len = {}",
            config.aggregation_limit
        ),
        "SET time_zone = '+00:00'".to_string(),
        "SET SESSION TRANSACTION READ ONLY".to_string(),
    ]
}

fn create_mysql_connection_pool(config: &SourceConfig, credentials: &Credentials) -> MySqlPool {
    use sqlx::Executor;

    let statements = session_statements(config);

    let pool = MySqlPoolOptions::new()
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
        .connect_lazy_with(mysql_connect_options(config, credentials));

    tracing::debug!(source = %config, "Created MySQL connection pool");
    pool
}
