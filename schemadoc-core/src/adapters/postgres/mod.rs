//! PostgreSQL dialect adapter.
//!
//! # Module Structure
//! - `connection`: pool creation and read-only session setup
//! - `extraction`: bulk `pg_catalog` queries, one per object class
//! - `type_mapping`: catalog code and type name translation
//!
//! Every user schema is extracted; `pg_catalog`, `information_schema`,
//! TOAST schemas and extension-owned objects are skipped.

pub mod connection;
pub(crate) mod extraction;
pub mod type_mapping;

#[cfg(test)]
mod tests;

use super::DialectAdapter;
use crate::Result;
use crate::config::SourceConfig;
use crate::models::{Dialect, RoutineRecord, TableRecord, TriggerRecord, ViewRecord};
use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::OnceCell;

pub use type_mapping::{
    map_referential_action, normalize_pg_type, parse_server_version_num, parse_trigger_type,
};

/// PostgreSQL adapter over every user schema of one database
pub struct PostgresAdapter {
    /// Connection pool for catalog queries
    pub pool: PgPool,
    /// Connection configuration (credential free)
    pub config: SourceConfig,
    /// Server major version, read once per adapter
    server_version: OnceCell<u32>,
}

impl std::fmt::Debug for PostgresAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresAdapter")
            .field("config", &self.config)
            .field("pool_size", &self.pool.size())
            .field("pool_idle", &self.pool.num_idle())
            .field("server_version", &self.server_version.get())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DialectAdapter for PostgresAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Pgsql
    }

    async fn list_tables(&self) -> Result<Vec<TableRecord>> {
        extraction::list_tables(self).await
    }

    async fn list_views(&self) -> Result<Vec<ViewRecord>> {
        extraction::list_views(self).await
    }

    async fn list_functions(&self) -> Result<Vec<RoutineRecord>> {
        extraction::list_functions(self).await
    }

    async fn list_procedures(&self) -> Result<Vec<RoutineRecord>> {
        extraction::list_procedures(self).await
    }

    async fn list_triggers(&self) -> Result<Vec<TriggerRecord>> {
        extraction::list_triggers(self).await
    }
}
