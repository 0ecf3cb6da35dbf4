//! Rows read back from the documentation repository.

use crate::models::KeyKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

/// A documented database registered in the repository
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseDescription {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// Description row of any object class
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DescriptionRow {
    pub id: i64,
    pub database_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub language: String,
    pub synced_at: Option<DateTime<Utc>>,
}

/// Table description row, which also carries the table's schema
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableDescription {
    pub id: i64,
    pub database_id: i64,
    pub name: String,
    pub schema_name: Option<String>,
    pub description: Option<String>,
    pub language: String,
    pub synced_at: Option<DateTime<Utc>>,
}

/// Column of a table or view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredColumn {
    pub id: i64,
    pub parent_id: i64,
    pub ordinal: i64,
    pub column_name: String,
    pub canonical_type: String,
    pub nullable: bool,
    pub key_kind: KeyKind,
    pub default_value: Option<String>,
    pub description: Option<String>,
    pub allowed_values: Option<String>,
    pub release_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredIndex {
    pub name: String,
    pub index_type: Option<String>,
    pub column_list: String,
    pub is_primary: bool,
    pub is_unique: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredRelation {
    pub constraint_name: String,
    pub column_name: String,
    pub referenced_table: String,
    pub referenced_column: String,
    pub on_delete_rule: Option<String>,
    pub on_update_rule: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewInformation {
    pub view_id: i64,
    pub schema_name: Option<String>,
    pub definition: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Information row shared by functions and stored procedures
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutineInformation {
    pub routine_id: i64,
    pub schema_name: Option<String>,
    pub definition: Option<String>,
    pub return_type: Option<String>,
    pub routine_language: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredParameter {
    pub ordinal: i64,
    pub parameter_name: String,
    pub canonical_type: String,
    pub mode: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerInformation {
    pub trigger_id: i64,
    pub schema_name: Option<String>,
    pub table_name: String,
    pub timing: String,
    pub events: String,
    pub definition: Option<String>,
    pub enabled: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

pub(crate) fn database_from_row(row: &SqliteRow) -> sqlx::Result<DatabaseDescription> {
    Ok(DatabaseDescription {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
    })
}

pub(crate) fn description_from_row(row: &SqliteRow) -> sqlx::Result<DescriptionRow> {
    Ok(DescriptionRow {
        id: row.try_get("id")?,
        database_id: row.try_get("database_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        language: row.try_get("language")?,
        synced_at: row.try_get("synced_at")?,
    })
}

pub(crate) fn table_from_row(row: &SqliteRow) -> sqlx::Result<TableDescription> {
    Ok(TableDescription {
        id: row.try_get("id")?,
        database_id: row.try_get("database_id")?,
        name: row.try_get("table_name")?,
        schema_name: row.try_get("schema_name")?,
        description: row.try_get("description")?,
        language: row.try_get("language")?,
        synced_at: row.try_get("synced_at")?,
    })
}

pub(crate) fn column_from_row(row: &SqliteRow) -> sqlx::Result<StoredColumn> {
    let key_kind: String = row.try_get("key_kind")?;
    Ok(StoredColumn {
        id: row.try_get("id")?,
        parent_id: row.try_get("parent_id")?,
        ordinal: row.try_get("ordinal")?,
        column_name: row.try_get("column_name")?,
        canonical_type: row.try_get("canonical_type")?,
        nullable: row.try_get("nullable")?,
        key_kind: KeyKind::parse(&key_kind),
        default_value: row.try_get("default_value")?,
        description: row.try_get("description")?,
        allowed_values: row.try_get("allowed_values")?,
        release_id: row.try_get("release_id")?,
    })
}

pub(crate) fn index_from_row(row: &SqliteRow) -> sqlx::Result<StoredIndex> {
    Ok(StoredIndex {
        name: row.try_get("name")?,
        index_type: row.try_get("index_type")?,
        column_list: row.try_get("column_list")?,
        is_primary: row.try_get("is_primary")?,
        is_unique: row.try_get("is_unique")?,
    })
}

pub(crate) fn relation_from_row(row: &SqliteRow) -> sqlx::Result<StoredRelation> {
    Ok(StoredRelation {
        constraint_name: row.try_get("constraint_name")?,
        column_name: row.try_get("column_name")?,
        referenced_table: row.try_get("referenced_table")?,
        referenced_column: row.try_get("referenced_column")?,
        on_delete_rule: row.try_get("on_delete_rule")?,
        on_update_rule: row.try_get("on_update_rule")?,
    })
}

pub(crate) fn view_information_from_row(row: &SqliteRow) -> sqlx::Result<ViewInformation> {
    Ok(ViewInformation {
        view_id: row.try_get("view_id")?,
        schema_name: row.try_get("schema_name")?,
        definition: row.try_get("definition")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(crate) fn routine_information_from_row(row: &SqliteRow) -> sqlx::Result<RoutineInformation> {
    Ok(RoutineInformation {
        routine_id: row.try_get("routine_id")?,
        schema_name: row.try_get("schema_name")?,
        definition: row.try_get("definition")?,
        return_type: row.try_get("return_type")?,
        routine_language: row.try_get("routine_language")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(crate) fn parameter_from_row(row: &SqliteRow) -> sqlx::Result<StoredParameter> {
    Ok(StoredParameter {
        ordinal: row.try_get("ordinal")?,
        parameter_name: row.try_get("parameter_name")?,
        canonical_type: row.try_get("canonical_type")?,
        mode: row.try_get("mode")?,
        description: row.try_get("description")?,
    })
}

pub(crate) fn trigger_information_from_row(row: &SqliteRow) -> sqlx::Result<TriggerInformation> {
    Ok(TriggerInformation {
        trigger_id: row.try_get("trigger_id")?,
        schema_name: row.try_get("schema_name")?,
        table_name: row.try_get("table_name")?,
        timing: row.try_get("timing")?,
        events: row.try_get("events")?,
        definition: row.try_get("definition")?,
        enabled: row.try_get("enabled")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
