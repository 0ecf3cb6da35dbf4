//! Transactional reconciliation of extracted objects into the repository.
//!
//! One object is reconciled per transaction: its description row is
//! inserted or updated in place (so the id users attach documentation to
//! never changes), its information row is upserted, and every dependent
//! child row is deleted and re-inserted in batches. Any failure rolls the
//! whole object back to its previous state.

use crate::config::SyncConfig;
use crate::error::{Result, SchemaDocError};
use crate::models::{
    ColumnRecord, IndexRecord, ObjectClass, ParameterRecord, ReferentialAction, RelationRecord,
    RoutineRecord, SchemaObject, TableRecord, TriggerRecord, ViewRecord,
};
use crate::store::{Family, Store};
use chrono::Utc;
use serde::Serialize;
use sqlx::sqlite::SqliteConnection;
use sqlx::{QueryBuilder, Row, Sqlite};
use std::collections::HashMap;

/// Outcome of reconciling one object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileResult {
    /// Stable id of the object's description row
    pub description_id: i64,
    /// Whether the description row was created by this call
    pub created: bool,
    /// Child rows written
    pub children: usize,
}

/// User documentation attached to a child row, carried across a replace.
#[derive(Debug, Default)]
struct KeptDocumentation {
    description: Option<String>,
    allowed_values: Option<String>,
    release_id: Option<i64>,
}

/// Writes extracted objects into the documentation repository.
#[derive(Debug, Clone)]
pub struct Reconciler {
    store: Store,
    config: SyncConfig,
}

/// Source comment wins; the stored description survives only when the
/// source has none and preservation is on.
fn merge_description(
    source: Option<&str>,
    stored: Option<String>,
    preserve: bool,
) -> Option<String> {
    match source {
        Some(comment) => Some(comment.to_string()),
        None if preserve => stored,
        None => None,
    }
}

impl Reconciler {
    pub fn new(store: Store, config: SyncConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Reconciles one object into `database_id` inside a single transaction.
    ///
    /// # Errors
    /// Returns a reconcile error if any statement fails; the object's stored
    /// rows are then exactly as they were before the call. Loss of the
    /// repository connection is reported as a connection error.
    pub async fn reconcile(
        &self,
        database_id: i64,
        object: &SchemaObject,
    ) -> Result<ReconcileResult> {
        let class = object.object_class();
        let name = object.name();
        let fail = |context: &'static str| {
            move |e: sqlx::Error| SchemaDocError::reconcile_failed(class, name, context, e)
        };

        let mut tx = self
            .store
            .pool()
            .begin()
            .await
            .map_err(fail("Failed to begin transaction"))?;

        let (description_id, created) = self
            .upsert_description(&mut tx, database_id, object)
            .await
            .map_err(fail("Failed to write description row"))?;

        let children = match object {
            SchemaObject::Table(table) => self
                .replace_table_children(&mut tx, description_id, table)
                .await
                .map_err(fail("Failed to replace table structure"))?,
            SchemaObject::View(view) => {
                upsert_view_information(&mut tx, description_id, view)
                    .await
                    .map_err(fail("Failed to write view information"))?;
                self.replace_view_columns(&mut tx, description_id, view)
                    .await
                    .map_err(fail("Failed to replace view columns"))?
            }
            SchemaObject::Function(routine) | SchemaObject::Procedure(routine) => {
                upsert_routine_information(&mut tx, class, description_id, routine)
                    .await
                    .map_err(fail("Failed to write routine information"))?;
                self.replace_parameters(&mut tx, class, description_id, routine)
                    .await
                    .map_err(fail("Failed to replace parameters"))?
            }
            SchemaObject::Trigger(trigger) => {
                upsert_trigger_information(&mut tx, description_id, trigger)
                    .await
                    .map_err(fail("Failed to write trigger information"))?;
                0
            }
        };

        tx.commit().await.map_err(fail("Failed to commit transaction"))?;

        tracing::debug!(
            object_class = %class,
            object_name = name,
            description_id,
            created,
            children,
            "Reconciled object"
        );

        Ok(ReconcileResult {
            description_id,
            created,
            children,
        })
    }

    /// Inserts or updates the description row in place, returning its id.
    async fn upsert_description(
        &self,
        conn: &mut SqliteConnection,
        database_id: i64,
        object: &SchemaObject,
    ) -> sqlx::Result<(i64, bool)> {
        let family = Family::of(object.object_class());
        let (comment, table_schema) = match object {
            SchemaObject::Table(table) => {
                (table.comment.as_deref(), Some(table.schema.as_deref()))
            }
            SchemaObject::View(view) => (view.comment.as_deref(), None),
            SchemaObject::Function(routine) | SchemaObject::Procedure(routine) => {
                (routine.comment.as_deref(), None)
            }
            SchemaObject::Trigger(trigger) => (trigger.comment.as_deref(), None),
        };

        let select = format!(
            "SELECT id, description FROM {} WHERE database_id = ? AND {} = ?",
            family.description_table, family.name_column
        );
        let existing = sqlx::query(&select)
            .bind(database_id)
            .bind(object.name())
            .fetch_optional(&mut *conn)
            .await?;

        let now = Utc::now();

        if let Some(row) = existing {
            let id: i64 = row.try_get("id")?;
            let stored: Option<String> = row.try_get("description")?;
            let description =
                merge_description(comment, stored, self.config.preserve_documentation);

            let mut update: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
                "UPDATE {} SET description = ",
                family.description_table
            ));
            update.push_bind(description);
            update.push(", synced_at = ").push_bind(now);
            if let Some(schema) = table_schema {
                update.push(", schema_name = ").push_bind(schema);
            }
            update.push(" WHERE id = ").push_bind(id);
            update.build().execute(&mut *conn).await?;

            Ok((id, false))
        } else {
            let mut insert: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
                "INSERT INTO {} (database_id, {}, description, language, synced_at",
                family.description_table, family.name_column
            ));
            if table_schema.is_some() {
                insert.push(", schema_name");
            }
            insert.push(") VALUES (");
            {
                let mut values = insert.separated(", ");
                values
                    .push_bind(database_id)
                    .push_bind(object.name())
                    .push_bind(comment)
                    .push_bind(self.config.language.as_str())
                    .push_bind(now);
                if let Some(schema) = table_schema {
                    values.push_bind(schema);
                }
            }
            insert.push(") RETURNING id");

            let row = insert.build().fetch_one(&mut *conn).await?;
            Ok((row.try_get("id")?, true))
        }
    }

    async fn replace_table_children(
        &self,
        conn: &mut SqliteConnection,
        table_id: i64,
        table: &TableRecord,
    ) -> sqlx::Result<usize> {
        let kept = self
            .kept_column_documentation(conn, "table_structure", "table_id", table_id)
            .await?;

        for child in Family::of(ObjectClass::Tables).child_tables {
            delete_children(conn, child, "table_id", table_id).await?;
        }

        self.insert_columns(conn, "table_structure", "table_id", table_id, &table.columns, &kept)
            .await?;
        self.insert_indexes(conn, table_id, &table.indexes).await?;
        self.insert_relations(conn, table_id, &table.relations).await?;

        Ok(table.columns.len() + table.indexes.len() + table.relations.len())
    }

    async fn replace_view_columns(
        &self,
        conn: &mut SqliteConnection,
        view_id: i64,
        view: &ViewRecord,
    ) -> sqlx::Result<usize> {
        let kept = self
            .kept_column_documentation(conn, "view_column", "view_id", view_id)
            .await?;
        delete_children(conn, "view_column", "view_id", view_id).await?;
        self.insert_columns(conn, "view_column", "view_id", view_id, &view.columns, &kept)
            .await?;
        Ok(view.columns.len())
    }

    async fn replace_parameters(
        &self,
        conn: &mut SqliteConnection,
        class: ObjectClass,
        routine_id: i64,
        routine: &RoutineRecord,
    ) -> sqlx::Result<usize> {
        let family = Family::of(class);
        let table = family.parameter_table().unwrap_or("func_parameter");
        let parent = family.parent_column;

        let kept: HashMap<String, Option<String>> = if self.config.preserve_documentation {
            let sql = format!(
                "SELECT parameter_name, description FROM {table} WHERE {parent} = ? \
                 AND description IS NOT NULL"
            );
            sqlx::query(&sql)
                .bind(routine_id)
                .fetch_all(&mut *conn)
                .await?
                .iter()
                .map(|row| -> sqlx::Result<(String, Option<String>)> {
                    Ok((row.try_get("parameter_name")?, row.try_get("description")?))
                })
                .collect::<sqlx::Result<_>>()?
        } else {
            HashMap::new()
        };

        delete_children(conn, table, parent, routine_id).await?;
        self.insert_parameters(conn, table, parent, routine_id, &routine.parameters, &kept)
            .await?;
        Ok(routine.parameters.len())
    }

    /// Reads user documentation of the columns about to be replaced.
    async fn kept_column_documentation(
        &self,
        conn: &mut SqliteConnection,
        table: &str,
        parent_column: &str,
        parent_id: i64,
    ) -> sqlx::Result<HashMap<String, KeptDocumentation>> {
        if !self.config.preserve_documentation {
            return Ok(HashMap::new());
        }

        let sql = format!(
            "SELECT column_name, description, allowed_values, release_id FROM {table} \
             WHERE {parent_column} = ? \
             AND (description IS NOT NULL OR allowed_values IS NOT NULL OR release_id IS NOT NULL)"
        );
        sqlx::query(&sql)
            .bind(parent_id)
            .fetch_all(&mut *conn)
            .await?
            .iter()
            .map(|row| -> sqlx::Result<(String, KeptDocumentation)> {
                Ok((
                    row.try_get("column_name")?,
                    KeptDocumentation {
                        description: row.try_get("description")?,
                        allowed_values: row.try_get("allowed_values")?,
                        release_id: row.try_get("release_id")?,
                    },
                ))
            })
            .collect()
    }

    async fn insert_columns(
        &self,
        conn: &mut SqliteConnection,
        table: &str,
        parent_column: &str,
        parent_id: i64,
        columns: &[ColumnRecord],
        kept: &HashMap<String, KeptDocumentation>,
    ) -> sqlx::Result<()> {
        let none = KeptDocumentation::default();
        for chunk in columns.chunks(self.config.batch_size.max(1)) {
            let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
                "INSERT INTO {table} ({parent_column}, ordinal, column_name, canonical_type, \
                 nullable, key_kind, default_value, description, allowed_values, release_id) "
            ));
            builder.push_values(chunk, |mut row, column| {
                let doc = kept.get(&column.name).unwrap_or(&none);
                row.push_bind(parent_id)
                    .push_bind(i64::from(column.ordinal))
                    .push_bind(column.name.as_str())
                    .push_bind(column.canonical_type.as_str())
                    .push_bind(column.nullable)
                    .push_bind(column.key_kind.as_str())
                    .push_bind(column.default_value.as_deref())
                    .push_bind(merge_description(
                        column.comment.as_deref(),
                        doc.description.clone(),
                        true,
                    ))
                    .push_bind(doc.allowed_values.clone())
                    .push_bind(doc.release_id);
            });
            builder.build().execute(&mut *conn).await?;
        }
        Ok(())
    }

    async fn insert_indexes(
        &self,
        conn: &mut SqliteConnection,
        table_id: i64,
        indexes: &[IndexRecord],
    ) -> sqlx::Result<()> {
        for chunk in indexes.chunks(self.config.batch_size.max(1)) {
            let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
                "INSERT INTO table_index (table_id, name, index_type, column_list, is_primary, \
                 is_unique) ",
            );
            builder.push_values(chunk, |mut row, index| {
                row.push_bind(table_id)
                    .push_bind(index.name.as_str())
                    .push_bind(index.index_type.as_deref())
                    .push_bind(index.column_list())
                    .push_bind(index.is_primary)
                    .push_bind(index.is_unique);
            });
            builder.build().execute(&mut *conn).await?;
        }
        Ok(())
    }

    async fn insert_relations(
        &self,
        conn: &mut SqliteConnection,
        table_id: i64,
        relations: &[RelationRecord],
    ) -> sqlx::Result<()> {
        for chunk in relations.chunks(self.config.batch_size.max(1)) {
            let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
                "INSERT INTO table_relation (table_id, constraint_name, column_name, \
                 referenced_table, referenced_column, on_delete_rule, on_update_rule) ",
            );
            builder.push_values(chunk, |mut row, relation| {
                row.push_bind(table_id)
                    .push_bind(relation.constraint_name.as_str())
                    .push_bind(relation.column_name.as_str())
                    .push_bind(relation.referenced_table.as_str())
                    .push_bind(relation.referenced_column.as_str())
                    .push_bind(relation.on_delete.as_ref().map(ReferentialAction::as_sql))
                    .push_bind(relation.on_update.as_ref().map(ReferentialAction::as_sql));
            });
            builder.build().execute(&mut *conn).await?;
        }
        Ok(())
    }

    async fn insert_parameters(
        &self,
        conn: &mut SqliteConnection,
        table: &str,
        parent_column: &str,
        routine_id: i64,
        parameters: &[ParameterRecord],
        kept: &HashMap<String, Option<String>>,
    ) -> sqlx::Result<()> {
        for chunk in parameters.chunks(self.config.batch_size.max(1)) {
            let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
                "INSERT INTO {table} ({parent_column}, ordinal, parameter_name, canonical_type, \
                 mode, description) "
            ));
            builder.push_values(chunk, |mut row, parameter| {
                row.push_bind(routine_id)
                    .push_bind(i64::from(parameter.ordinal))
                    .push_bind(parameter.name.as_str())
                    .push_bind(parameter.canonical_type.as_str())
                    .push_bind(parameter.mode.as_str())
                    .push_bind(kept.get(&parameter.name).cloned().flatten());
            });
            builder.build().execute(&mut *conn).await?;
        }
        Ok(())
    }
}

async fn delete_children(
    conn: &mut SqliteConnection,
    table: &str,
    parent_column: &str,
    parent_id: i64,
) -> sqlx::Result<()> {
    let sql = format!("DELETE FROM {table} WHERE {parent_column} = ?");
    sqlx::query(&sql).bind(parent_id).execute(&mut *conn).await?;
    Ok(())
}

async fn upsert_view_information(
    conn: &mut SqliteConnection,
    view_id: i64,
    view: &ViewRecord,
) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO view_information (view_id, schema_name, definition, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT (view_id) DO UPDATE SET \
           schema_name = excluded.schema_name, \
           definition = excluded.definition, \
           created_at = excluded.created_at, \
           updated_at = excluded.updated_at",
    )
    .bind(view_id)
    .bind(view.schema.as_deref())
    .bind(view.definition.as_deref())
    .bind(view.created_at)
    .bind(view.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn upsert_routine_information(
    conn: &mut SqliteConnection,
    class: ObjectClass,
    routine_id: i64,
    routine: &RoutineRecord,
) -> sqlx::Result<()> {
    let family = Family::of(class);
    let sql = format!(
        "INSERT INTO {table} ({key}, schema_name, definition, return_type, routine_language, \
         created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT ({key}) DO UPDATE SET \
           schema_name = excluded.schema_name, \
           definition = excluded.definition, \
           return_type = excluded.return_type, \
           routine_language = excluded.routine_language, \
           created_at = excluded.created_at, \
           updated_at = excluded.updated_at",
        table = family.information_table.unwrap_or("func_information"),
        key = family.parent_column,
    );
    sqlx::query(&sql)
        .bind(routine_id)
        .bind(routine.schema.as_deref())
        .bind(routine.definition.as_deref())
        .bind(routine.return_type.as_deref())
        .bind(routine.language.as_deref())
        .bind(routine.created_at)
        .bind(routine.updated_at)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn upsert_trigger_information(
    conn: &mut SqliteConnection,
    trigger_id: i64,
    trigger: &TriggerRecord,
) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO trigger_information (trigger_id, schema_name, table_name, timing, events, \
         definition, enabled, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT (trigger_id) DO UPDATE SET \
           schema_name = excluded.schema_name, \
           table_name = excluded.table_name, \
           timing = excluded.timing, \
           events = excluded.events, \
           definition = excluded.definition, \
           enabled = excluded.enabled, \
           created_at = excluded.created_at, \
           updated_at = excluded.updated_at",
    )
    .bind(trigger_id)
    .bind(trigger.schema.as_deref())
    .bind(trigger.table_name.as_str())
    .bind(trigger.timing.as_str())
    .bind(trigger.event_list())
    .bind(trigger.definition.as_deref())
    .bind(trigger.enabled)
    .bind(trigger.created_at)
    .bind(trigger.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_comment_wins() {
        assert_eq!(
            merge_description(Some("from source"), Some("typed by user".into()), true).as_deref(),
            Some("from source")
        );
    }

    #[test]
    fn test_stored_description_preserved_without_source_comment() {
        assert_eq!(
            merge_description(None, Some("typed by user".into()), true).as_deref(),
            Some("typed by user")
        );
        assert_eq!(merge_description(None, Some("typed by user".into()), false), None);
    }
}
