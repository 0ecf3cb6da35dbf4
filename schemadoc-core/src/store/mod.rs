//! SQLite documentation repository.
//!
//! The repository holds one description row per documented object plus the
//! structural rows a synchronization pass rewrites. Reads are plain queries
//! over the pool; writes on behalf of a synchronization pass go through
//! [`crate::reconcile::Reconciler`], which owns the transactions.

mod family;
mod rows;

pub(crate) use family::Family;
pub use rows::{
    DatabaseDescription, DescriptionRow, RoutineInformation, StoredColumn, StoredIndex,
    StoredParameter, StoredRelation, TableDescription, TriggerInformation, ViewInformation,
};

use crate::error::{Result, SchemaDocError};
use crate::models::ObjectClass;
use rows::{
    column_from_row, database_from_row, description_from_row, index_from_row,
    parameter_from_row, relation_from_row, routine_information_from_row, table_from_row,
    trigger_information_from_row, view_information_from_row,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

const REPOSITORY_SCHEMA: &str = include_str!("../../migrations/0001_repository.sql");

/// Handle to the documentation repository.
///
/// Cloning is cheap; clones share the underlying pool.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

fn decode_all<T>(
    rows: &[SqliteRow],
    decode: fn(&SqliteRow) -> sqlx::Result<T>,
    context: &str,
) -> Result<Vec<T>> {
    rows.iter()
        .map(decode)
        .collect::<sqlx::Result<Vec<_>>>()
        .map_err(|e| SchemaDocError::store_failed(context, e))
}

impl Store {
    /// Opens (creating if missing) the repository at `url` and applies the
    /// repository schema.
    ///
    /// # Errors
    /// Returns error if the URL is invalid or the database cannot be opened
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| SchemaDocError::store_failed("Invalid repository URL", e))?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| SchemaDocError::connection_failed("Failed to open repository", e))?;

        let store = Self { pool };
        store.apply_schema().await?;
        tracing::debug!("Opened documentation repository");
        Ok(store)
    }

    /// Opens a private in-memory repository.
    ///
    /// The pool is pinned to a single connection that never expires, since
    /// every SQLite in-memory connection is a separate database.
    ///
    /// # Errors
    /// Returns error if SQLite cannot be initialized
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| SchemaDocError::store_failed("Invalid repository URL", e))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| SchemaDocError::connection_failed("Failed to open repository", e))?;

        let store = Self { pool };
        store.apply_schema().await?;
        Ok(store)
    }

    async fn apply_schema(&self) -> Result<()> {
        sqlx::raw_sql(REPOSITORY_SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| SchemaDocError::store_failed("Failed to apply repository schema", e))?;
        Ok(())
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Whether [`Store::close`] has been called on this pool.
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Registers a database to document and returns its id.
    ///
    /// # Errors
    /// Returns error if a database of that name already exists in the project
    pub async fn create_database(
        &self,
        project_id: i64,
        name: &str,
        description: Option<&str>,
    ) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO database_description (project_id, name, description) \
             VALUES (?, ?, ?) RETURNING id",
        )
        .bind(project_id)
        .bind(name)
        .bind(description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            SchemaDocError::store_failed(format!("Failed to register database '{name}'"), e)
        })?;

        tracing::info!(database_id = id, project_id, name, "Registered database");
        Ok(id)
    }

    /// Looks up a registered database by project and name.
    pub async fn find_database(&self, project_id: i64, name: &str) -> Result<Option<i64>> {
        sqlx::query_scalar("SELECT id FROM database_description WHERE project_id = ? AND name = ?")
            .bind(project_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SchemaDocError::store_failed("Failed to look up database", e))
    }

    pub async fn database(&self, database_id: i64) -> Result<Option<DatabaseDescription>> {
        let row = sqlx::query(
            "SELECT id, project_id, name, description FROM database_description WHERE id = ?",
        )
        .bind(database_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SchemaDocError::store_failed("Failed to read database", e))?;

        row.as_ref()
            .map(database_from_row)
            .transpose()
            .map_err(|e| SchemaDocError::store_failed("Failed to decode database row", e))
    }

    /// All documented tables of a database, ordered by name.
    pub async fn tables(&self, database_id: i64) -> Result<Vec<TableDescription>> {
        let rows = sqlx::query(
            "SELECT id, database_id, table_name, schema_name, description, language, synced_at \
             FROM table_description WHERE database_id = ? ORDER BY table_name",
        )
        .bind(database_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SchemaDocError::store_failed("Failed to read tables", e))?;

        decode_all(&rows, table_from_row, "Failed to decode table row")
    }

    pub async fn table(&self, database_id: i64, name: &str) -> Result<Option<TableDescription>> {
        let row = sqlx::query(
            "SELECT id, database_id, table_name, schema_name, description, language, synced_at \
             FROM table_description WHERE database_id = ? AND table_name = ?",
        )
        .bind(database_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SchemaDocError::store_failed("Failed to read table", e))?;

        row.as_ref()
            .map(table_from_row)
            .transpose()
            .map_err(|e| SchemaDocError::store_failed("Failed to decode table row", e))
    }

    /// Description rows of one object class, ordered by name.
    pub async fn descriptions(
        &self,
        class: ObjectClass,
        database_id: i64,
    ) -> Result<Vec<DescriptionRow>> {
        let family = Family::of(class);
        let sql = format!(
            "SELECT id, database_id, {name} AS name, description, language, synced_at \
             FROM {table} WHERE database_id = ? ORDER BY {name}",
            name = family.name_column,
            table = family.description_table,
        );
        let rows = sqlx::query(&sql)
            .bind(database_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SchemaDocError::store_failed(format!("Failed to read {class}"), e))?;

        decode_all(&rows, description_from_row, "Failed to decode description row")
    }

    pub async fn description(
        &self,
        class: ObjectClass,
        database_id: i64,
        name: &str,
    ) -> Result<Option<DescriptionRow>> {
        let family = Family::of(class);
        let sql = format!(
            "SELECT id, database_id, {name} AS name, description, language, synced_at \
             FROM {table} WHERE database_id = ? AND {name} = ?",
            name = family.name_column,
            table = family.description_table,
        );
        let row = sqlx::query(&sql)
            .bind(database_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SchemaDocError::store_failed(format!("Failed to read {class}"), e))?;

        row.as_ref()
            .map(description_from_row)
            .transpose()
            .map_err(|e| SchemaDocError::store_failed("Failed to decode description row", e))
    }

    /// Overwrites the user-facing description of one object.
    ///
    /// Returns false if no such object exists.
    pub async fn set_description(
        &self,
        class: ObjectClass,
        id: i64,
        description: Option<&str>,
    ) -> Result<bool> {
        let family = Family::of(class);
        let sql = format!(
            "UPDATE {} SET description = ? WHERE id = ?",
            family.description_table
        );
        let result = sqlx::query(&sql)
            .bind(description)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| SchemaDocError::store_failed("Failed to update description", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn read_columns(
        &self,
        table: &str,
        parent_column: &str,
        parent_id: i64,
    ) -> Result<Vec<StoredColumn>> {
        let sql = format!(
            "SELECT id, {parent_column} AS parent_id, ordinal, column_name, canonical_type, nullable, \
             key_kind, default_value, description, allowed_values, release_id \
             FROM {table} WHERE {parent_column} = ? ORDER BY ordinal"
        );
        let rows = sqlx::query(&sql)
            .bind(parent_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SchemaDocError::store_failed("Failed to read columns", e))?;

        decode_all(&rows, column_from_row, "Failed to decode column row")
    }

    /// Columns of one table in ordinal order.
    pub async fn columns(&self, table_id: i64) -> Result<Vec<StoredColumn>> {
        self.read_columns("table_structure", "table_id", table_id).await
    }

    /// Output columns of one view in ordinal order.
    pub async fn view_columns(&self, view_id: i64) -> Result<Vec<StoredColumn>> {
        self.read_columns("view_column", "view_id", view_id).await
    }

    /// Columns of many tables, grouped by table id.
    ///
    /// Ids are sent in IN-lists of at most `chunk_size` entries to stay under
    /// the bind parameter ceiling.
    pub async fn columns_for_tables(
        &self,
        table_ids: &[i64],
        chunk_size: usize,
    ) -> Result<HashMap<i64, Vec<StoredColumn>>> {
        let mut grouped: HashMap<i64, Vec<StoredColumn>> = HashMap::new();

        for chunk in table_ids.chunks(chunk_size.max(1)) {
            let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
                "SELECT id, table_id AS parent_id, ordinal, column_name, canonical_type, nullable, \
                 key_kind, default_value, description, allowed_values, release_id \
                 FROM table_structure WHERE table_id IN (",
            );
            let mut separated = builder.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(") ORDER BY table_id, ordinal");

            let rows = builder
                .build()
                .fetch_all(&self.pool)
                .await
                .map_err(|e| SchemaDocError::store_failed("Failed to read columns", e))?;

            for column in decode_all(&rows, column_from_row, "Failed to decode column row")? {
                grouped.entry(column.parent_id).or_default().push(column);
            }
        }

        Ok(grouped)
    }

    pub async fn indexes(&self, table_id: i64) -> Result<Vec<StoredIndex>> {
        let rows = sqlx::query(
            "SELECT name, index_type, column_list, is_primary, is_unique \
             FROM table_index WHERE table_id = ? ORDER BY name",
        )
        .bind(table_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SchemaDocError::store_failed("Failed to read indexes", e))?;

        decode_all(&rows, index_from_row, "Failed to decode index row")
    }

    pub async fn relations(&self, table_id: i64) -> Result<Vec<StoredRelation>> {
        let rows = sqlx::query(
            "SELECT constraint_name, column_name, referenced_table, referenced_column, \
             on_delete_rule, on_update_rule \
             FROM table_relation WHERE table_id = ? ORDER BY constraint_name, id",
        )
        .bind(table_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SchemaDocError::store_failed("Failed to read relations", e))?;

        decode_all(&rows, relation_from_row, "Failed to decode relation row")
    }

    pub async fn view_information(&self, view_id: i64) -> Result<Option<ViewInformation>> {
        let row = sqlx::query(
            "SELECT view_id, schema_name, definition, created_at, updated_at \
             FROM view_information WHERE view_id = ?",
        )
        .bind(view_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SchemaDocError::store_failed("Failed to read view information", e))?;

        row.as_ref()
            .map(view_information_from_row)
            .transpose()
            .map_err(|e| SchemaDocError::store_failed("Failed to decode view information", e))
    }

    /// Information row of a function or stored procedure.
    ///
    /// # Errors
    /// Returns a configuration error for classes that are not routines
    pub async fn routine_information(
        &self,
        class: ObjectClass,
        routine_id: i64,
    ) -> Result<Option<RoutineInformation>> {
        let family = routine_family(class)?;
        let sql = format!(
            "SELECT {key} AS routine_id, schema_name, definition, return_type, routine_language, \
             created_at, updated_at FROM {table} WHERE {key} = ?",
            key = family.parent_column,
            table = family.information_table.unwrap_or_default(),
        );
        let row = sqlx::query(&sql)
            .bind(routine_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SchemaDocError::store_failed("Failed to read routine information", e))?;

        row.as_ref()
            .map(routine_information_from_row)
            .transpose()
            .map_err(|e| SchemaDocError::store_failed("Failed to decode routine information", e))
    }

    /// Parameters of a function or stored procedure in ordinal order.
    ///
    /// # Errors
    /// Returns a configuration error for classes that are not routines
    pub async fn parameters(
        &self,
        class: ObjectClass,
        routine_id: i64,
    ) -> Result<Vec<StoredParameter>> {
        let family = routine_family(class)?;
        let sql = format!(
            "SELECT ordinal, parameter_name, canonical_type, mode, description \
             FROM {table} WHERE {key} = ? ORDER BY ordinal",
            key = family.parent_column,
            table = family.parameter_table().unwrap_or_default(),
        );
        let rows = sqlx::query(&sql)
            .bind(routine_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SchemaDocError::store_failed("Failed to read parameters", e))?;

        decode_all(&rows, parameter_from_row, "Failed to decode parameter row")
    }

    pub async fn trigger_information(&self, trigger_id: i64) -> Result<Option<TriggerInformation>> {
        let row = sqlx::query(
            "SELECT trigger_id, schema_name, table_name, timing, events, definition, enabled, \
             created_at, updated_at FROM trigger_information WHERE trigger_id = ?",
        )
        .bind(trigger_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SchemaDocError::store_failed("Failed to read trigger information", e))?;

        row.as_ref()
            .map(trigger_information_from_row)
            .transpose()
            .map_err(|e| SchemaDocError::store_failed("Failed to decode trigger information", e))
    }

    /// Records user documentation on one table column.
    ///
    /// Returns false if the column does not exist.
    pub async fn set_column_documentation(
        &self,
        table_id: i64,
        column_name: &str,
        description: Option<&str>,
        allowed_values: Option<&str>,
        release_id: Option<i64>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE table_structure SET description = ?, allowed_values = ?, release_id = ? \
             WHERE table_id = ? AND column_name = ?",
        )
        .bind(description)
        .bind(allowed_values)
        .bind(release_id)
        .bind(table_id)
        .bind(column_name)
        .execute(&self.pool)
        .await
        .map_err(|e| SchemaDocError::store_failed("Failed to update column documentation", e))?;

        Ok(result.rows_affected() > 0)
    }

    /// Counts dependent rows whose description row no longer exists.
    ///
    /// A healthy repository always reports zero.
    pub async fn orphan_count(&self) -> Result<i64> {
        let mut total = 0;
        for class in ObjectClass::ALL {
            let family = Family::of(class);
            for dependent in family.dependent_tables() {
                let sql = format!(
                    "SELECT COUNT(*) FROM {dependent} d WHERE NOT EXISTS \
                     (SELECT 1 FROM {parent} p WHERE p.id = d.{key})",
                    parent = family.description_table,
                    key = family.parent_column,
                );
                let row = sqlx::query(&sql)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(|e| SchemaDocError::store_failed("Failed to count orphans", e))?;
                let count: i64 = row
                    .try_get(0)
                    .map_err(|e| SchemaDocError::store_failed("Failed to count orphans", e))?;
                total += count;
            }
        }
        Ok(total)
    }
}

fn routine_family(class: ObjectClass) -> Result<&'static Family> {
    match class {
        ObjectClass::Functions | ObjectClass::Procedures => Ok(Family::of(class)),
        other => Err(SchemaDocError::configuration(format!(
            "{other} are not routines"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_store_applies_schema() {
        let store = Store::in_memory().await.unwrap();
        let id = store.create_database(1, "shop", Some("Web shop")).await.unwrap();

        let database = store.database(id).await.unwrap().unwrap();
        assert_eq!(database.name, "shop");
        assert_eq!(database.description.as_deref(), Some("Web shop"));
        assert_eq!(store.find_database(1, "shop").await.unwrap(), Some(id));
        assert_eq!(store.find_database(2, "shop").await.unwrap(), None);
        assert!(store.tables(id).await.unwrap().is_empty());
        assert_eq!(store.orphan_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_database_rejected() {
        let store = Store::in_memory().await.unwrap();
        store.create_database(1, "shop", None).await.unwrap();
        let err = store.create_database(1, "shop", None).await.unwrap_err();
        assert!(matches!(err, SchemaDocError::Store { .. }));
    }

    #[tokio::test]
    async fn test_schema_is_reapplicable() {
        let store = Store::in_memory().await.unwrap();
        store.apply_schema().await.unwrap();
        store.create_database(1, "shop", None).await.unwrap();
        store.apply_schema().await.unwrap();
        assert!(store.find_database(1, "shop").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_routine_queries_reject_other_classes() {
        let store = Store::in_memory().await.unwrap();
        let err = store.parameters(ObjectClass::Views, 1).await.unwrap_err();
        assert!(matches!(err, SchemaDocError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_missing_rows_read_as_none() {
        let store = Store::in_memory().await.unwrap();
        assert!(store.database(42).await.unwrap().is_none());
        assert!(store.view_information(42).await.unwrap().is_none());
        assert!(store.trigger_information(42).await.unwrap().is_none());
        assert!(
            !store
                .set_column_documentation(42, "id", Some("x"), None, None)
                .await
                .unwrap()
        );
    }
}
