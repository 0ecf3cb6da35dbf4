//! MySQL dialect adapter.
//!
//! # Module Structure
//! - `connection`: pool creation and read-only session setup
//! - `extraction`: bulk `information_schema` queries, one per object class
//!
//! # Security Guarantees
//! - Sessions are `READ ONLY` and bounded by `max_execution_time`
//! - The pool is built from typed options; no URL with a password is kept

pub mod connection;
pub(crate) mod extraction;


use super::DialectAdapter;
use crate::Result;
use crate::config::SourceConfig;
use crate::models::{Dialect, RoutineRecord, TableRecord, TriggerRecord, ViewRecord};
use async_trait::async_trait;
use sqlx::MySqlPool;

/// MySQL adapter scoped to the connection's default database
pub struct MySqlAdapter {
    /// Connection pool for catalog queries
    pub pool: MySqlPool,
    /// Connection configuration (credential free)
    pub config: SourceConfig,
}

impl std::fmt::Debug for MySqlAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlAdapter")
            .field("config", &self.config)
            .field("pool_size", &self.pool.size())
            .field("pool_idle", &self.pool.num_idle())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DialectAdapter for MySqlAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Mysql
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
