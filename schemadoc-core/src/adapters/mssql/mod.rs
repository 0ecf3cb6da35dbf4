//! SQL Server dialect adapter.
//!
//! # Module Structure
//! - `connection`: TDS client setup, session settings and query checkout
//! - `extraction`: bulk `sys.*` catalog queries, one per object class
//!
//! The adapter owns a single tiberius client. Each catalog query checks the
//! client out of the adapter and hands it back only when the query
//! completes, so a failed or timed out query leaves no half-read response
//! behind: the next call opens a fresh connection.

pub mod connection;
pub(crate) mod extraction;


use super::DialectAdapter;
use crate::Result;
use crate::config::SourceConfig;
use crate::models::{Dialect, RoutineRecord, TableRecord, TriggerRecord, ViewRecord};
use async_trait::async_trait;
use tiberius::Client;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::Compat;

/// TDS client over a tokio TCP stream
pub type MssqlClient = Client<Compat<TcpStream>>;

/// SQL Server adapter over every user schema of one database
pub struct MssqlAdapter {
    /// Connection configuration (credential free)
    pub config: SourceConfig,
    connect_config: tiberius::Config,
    client: Mutex<Option<MssqlClient>>,
}

impl std::fmt::Debug for MssqlAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MssqlAdapter")
            .field("config", &self.config)
            .field("connected", &self.client.try_lock().map(|c| c.is_some()).ok())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DialectAdapter for MssqlAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Mssql
    }

    async fn list_tables(&self) -> Result<Vec<TableRecord>> {
        extraction::list_tables(self).await
    }

    async fn list_views(&self) -> Result<Vec<ViewRecord>> {
        extraction::list_views(self).await
    }

    async fn list_functions(&self) -> Result<Vec<RoutineRecord>> {
        extraction::list_routines(self, extraction::RoutineKind::Function).await
    }

    async fn list_procedures(&self) -> Result<Vec<RoutineRecord>> {
        extraction::list_routines(self, extraction::RoutineKind::Procedure).await
    }

    async fn list_triggers(&self) -> Result<Vec<TriggerRecord>> {
        extraction::list_triggers(self).await
    }
}
