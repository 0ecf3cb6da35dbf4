//! SQL Server client management.

use super::{MssqlAdapter, MssqlClient};
use crate::Result;
use crate::config::SourceConfig;
use crate::error::SchemaDocError;
use crate::models::ObjectClass;
use crate::security::Credentials;
use tiberius::{AuthMethod, Client, Config, Row};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::TokioAsyncWriteCompatExt;

impl MssqlAdapter {
    /// Creates a SQL Server adapter; the TDS connection opens on first use.
    ///
    /// # Errors
    /// Returns error if the configuration is invalid
    pub async fn connect(config: &SourceConfig, credentials: &Credentials) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: config.clone(),
            connect_config: tds_config(config, credentials),
            client: Mutex::new(None),
        })
    }

    /// Runs `SELECT 1`, opening the TDS connection.
    ///
    /// # Errors
    /// Returns a connection error if the server is unreachable, rejects the
    /// login, or refuses the session settings
    pub async fn test_connection(&self) -> Result<()> {
        let connection_error = |e: tiberius::error::Error| {
            SchemaDocError::connection_failed(format!("Failed to connect to {}", self.config), e)
        };

        let mut client = self.checkout().await.map_err(connection_error)?;
        let row = async { client.simple_query("SELECT 1").await?.into_row().await }
            .await
            .map_err(connection_error)?;

        if row.and_then(|row| row.try_get::<i32, _>(0).ok().flatten()) != Some(1) {
            return Err(SchemaDocError::configuration(
                "Basic connectivity test failed: unexpected result",
            ));
        }
        self.checkin(client).await;
        Ok(())
    }

    /// Closes the TDS connection if one is open
    pub async fn close(&self) {
        let idle = self.client.lock().await.take();
        if let Some(client) = idle
            && let Err(e) = client.close().await
        {
            tracing::debug!(error = %e, "SQL Server connection did not close cleanly");
        }
    }

    /// Runs one catalog query and returns the rows of its first result set.
    ///
    /// The query is bounded by the configured query timeout. The client is
    /// only handed back to the adapter when every row has been read.
    pub(crate) async fn query_catalog(&self, sql: &str, class: ObjectClass) -> Result<Vec<Row>> {
        let mut client = self
            .checkout()
            .await
            .map_err(|e| SchemaDocError::from_mssql_query(class, e))?;

        let query = async { client.simple_query(sql).await?.into_first_result().await };
        let rows = match tokio::time::timeout(self.config.query_timeout, query).await {
            Ok(Ok(rows)) => rows,
            Ok(Err(e)) => return Err(SchemaDocError::from_mssql_query(class, e)),
            Err(_) => {
                return Err(SchemaDocError::Timeout {
                    object_class: class,
                    timeout: self.config.query_timeout,
                });
            }
        };

        self.checkin(client).await;
        Ok(rows)
    }

    async fn checkout(&self) -> std::result::Result<MssqlClient, tiberius::error::Error> {
        let idle = self.client.lock().await.take();
        match idle {
            Some(client) => Ok(client),
            None => self.open_client().await,
        }
    }

    async fn checkin(&self, client: MssqlClient) {
        *self.client.lock().await = Some(client);
    }

    async fn open_client(&self) -> std::result::Result<MssqlClient, tiberius::error::Error> {
        let connect = async {
            let tcp = TcpStream::connect(self.connect_config.get_addr()).await?;
            tcp.set_nodelay(true)?;

            let mut client =
                Client::connect(self.connect_config.clone(), tcp.compat_write()).await?;
            for statement in session_statements(&self.config) {
                client.execute(statement, &[]).await?;
            }
            Ok::<_, tiberius::error::Error>(client)
        };

        let client = tokio::time::timeout(self.config.connect_timeout, connect)
            .await
            .map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("connect timed out after {:?}", self.config.connect_timeout),
                )
            })??;

        tracing::debug!(source = %self.config, "Opened SQL Server connection");
        Ok(client)
    }
}

/// TDS login configuration built from typed settings.
pub fn tds_config(config: &SourceConfig, credentials: &Credentials) -> Config {
    let mut tds = Config::new();
    tds.host(&config.host);
    tds.port(config.effective_port());
    tds.authentication(AuthMethod::sql_server(
        credentials.username(),
        credentials.password(),
    ));
    tds.application_name(concat!("schemadoc-sync-", env!("CARGO_PKG_VERSION")));

    if let Some(database) = &config.database {
        tds.database(database);
    }
    if config.trust_server_certificate {
        tds.trust_cert();
    }
    tds
}

/// Statements every new connection runs before its first catalog query.
///
/// `TEXTSIZE` is raised so `FOR JSON` payloads are never cut off.
pub fn session_statements(config: &SourceConfig) -> Vec<String> {
    let lock_timeout = config.query_timeout.as_millis().min(i32::MAX as u128);
    vec![
        "SET NOCOUNT ON".to_string(),
        format!("SET LOCK_TIMEOUT {lock_timeout}"),
        "SET TEXTSIZE 2147483647".to_string(),
        "SET TRANSACTION ISOLATION LEVEL READ COMMITTED".to_string(),
    ]
}
