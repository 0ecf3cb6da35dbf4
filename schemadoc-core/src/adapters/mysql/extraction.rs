//! MySQL catalog extraction.
//!
//! Every class is read with one query against `information_schema`, scoped
//! to `DATABASE()`. Child collections are pre-aggregated per table in
//! derived tables with `JSON_ARRAYAGG` and joined back, which keeps the
//! queries uncorrelated and valid on MySQL 5.7.22 and later.

use super::MySqlAdapter;
use crate::Result;
use crate::adapters::packed::{PackedTable, Standard, decode_columns, decode_parameters, non_empty};
use crate::error::SchemaDocError;
use crate::models::{
    Dialect, ObjectClass, RoutineRecord, TableRecord, TriggerEvent, TriggerRecord, TriggerTiming,
    ViewRecord,
};
use crate::type_format::format_type;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::Row;
use sqlx::mysql::MySqlRow;

/// `information_schema.ROUTINES.ROUTINE_TYPE` discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RoutineKind {
    Function,
    Procedure,
}

impl RoutineKind {
    fn routine_type(self) -> &'static str {
        match self {
            RoutineKind::Function => "FUNCTION",
            RoutineKind::Procedure => "PROCEDURE",
        }
    }

    fn object_class(self) -> ObjectClass {
        match self {
            RoutineKind::Function => ObjectClass::Functions,
            RoutineKind::Procedure => ObjectClass::Procedures,
        }
    }
}

/// Column payload shared by tables and views.
const COLUMNS_BY_TABLE: &str = r"
    SELECT
        c.TABLE_NAME AS table_name,
        JSON_ARRAYAGG(JSON_OBJECT(
            'name', c.COLUMN_NAME,
            'ordinal', c.ORDINAL_POSITION,
            'type_name', IF(c.DATA_TYPE IN ('enum', 'set'), c.COLUMN_TYPE, c.DATA_TYPE),
            'max_length', c.CHARACTER_MAXIMUM_LENGTH,
            'precision', c.NUMERIC_PRECISION,
            'scale', c.NUMERIC_SCALE,
            'nullable', c.IS_NULLABLE = 'YES',
            'default_value', c.COLUMN_DEFAULT,
            'comment', c.COLUMN_COMMENT
        )) AS columns_json
    FROM information_schema.COLUMNS c
    WHERE c.TABLE_SCHEMA = DATABASE()
    GROUP BY c.TABLE_NAME";

pub(crate) fn tables_query() -> String {
    format!(
        r"
SELECT
    CAST(t.TABLE_SCHEMA AS CHAR) AS table_schema,
    CAST(t.TABLE_NAME AS CHAR) AS table_name,
    CAST(t.TABLE_COMMENT AS CHAR) AS table_comment,
    CAST(COALESCE(cols.columns_json, JSON_ARRAY()) AS CHAR) AS columns_json,
    CAST(COALESCE(ix.indexes_json, JSON_ARRAY()) AS CHAR) AS indexes_json,
    CAST(COALESCE(fk.relations_json, JSON_ARRAY()) AS CHAR) AS relations_json
FROM information_schema.TABLES t
LEFT JOIN ({COLUMNS_BY_TABLE}) cols ON cols.table_name = t.TABLE_NAME
LEFT JOIN (
    SELECT
        s.table_name,
        JSON_ARRAYAGG(JSON_OBJECT(
            'name', s.index_name,
            'index_type', s.index_type,
            'column_list', s.column_list,
            'is_primary', s.index_name = 'PRIMARY',
            'is_unique', s.non_unique = 0
        )) AS indexes_json
    FROM (
        SELECT
            st.TABLE_NAME AS table_name,
            st.INDEX_NAME AS index_name,
            MAX(st.INDEX_TYPE) AS index_type,
            MIN(st.NON_UNIQUE) AS non_unique,
            GROUP_CONCAT(st.COLUMN_NAME ORDER BY st.SEQ_IN_INDEX SEPARATOR ',') AS column_list
        FROM information_schema.STATISTICS st
        WHERE st.TABLE_SCHEMA = DATABASE()
        GROUP BY st.TABLE_NAME, st.INDEX_NAME
    ) s
    GROUP BY s.table_name
) ix ON ix.table_name = t.TABLE_NAME
LEFT JOIN (
    SELECT
        k.TABLE_NAME AS table_name,
        JSON_ARRAYAGG(JSON_OBJECT(
            'constraint_name', k.CONSTRAINT_NAME,
            'position', k.ORDINAL_POSITION,
            'column_name', k.COLUMN_NAME,
            'referenced_table', k.REFERENCED_TABLE_NAME,
            'referenced_column', k.REFERENCED_COLUMN_NAME,
            'on_delete', rc.DELETE_RULE,
            'on_update', rc.UPDATE_RULE
        )) AS relations_json
    FROM information_schema.KEY_COLUMN_USAGE k
    JOIN information_schema.REFERENTIAL_CONSTRAINTS rc
        ON rc.CONSTRAINT_SCHEMA = k.CONSTRAINT_SCHEMA
        AND rc.CONSTRAINT_NAME = k.CONSTRAINT_NAME
        AND rc.TABLE_NAME = k.TABLE_NAME
    WHERE k.TABLE_SCHEMA = DATABASE()
        AND k.REFERENCED_TABLE_NAME IS NOT NULL
    GROUP BY k.TABLE_NAME
) fk ON fk.table_name = t.TABLE_NAME
WHERE t.TABLE_SCHEMA = DATABASE()
    AND t.TABLE_TYPE = 'BASE TABLE'
ORDER BY t.TABLE_NAME"
    )
}

pub(crate) fn views_query() -> String {
    format!(
        r"
SELECT
    CAST(v.TABLE_SCHEMA AS CHAR) AS view_schema,
    CAST(v.TABLE_NAME AS CHAR) AS view_name,
    CAST(NULLIF(t.TABLE_COMMENT, 'VIEW') AS CHAR) AS view_comment,
    CAST(v.VIEW_DEFINITION AS CHAR) AS definition,
    t.CREATE_TIME AS created_at,
    t.UPDATE_TIME AS updated_at,
    CAST(COALESCE(cols.columns_json, JSON_ARRAY()) AS CHAR) AS columns_json
FROM information_schema.VIEWS v
JOIN information_schema.TABLES t
    ON t.TABLE_SCHEMA = v.TABLE_SCHEMA AND t.TABLE_NAME = v.TABLE_NAME
LEFT JOIN ({COLUMNS_BY_TABLE}) cols ON cols.table_name = v.TABLE_NAME
WHERE v.TABLE_SCHEMA = DATABASE()
ORDER BY v.TABLE_NAME"
    )
}

const ROUTINES_QUERY: &str = r"
SELECT
    CAST(r.ROUTINE_SCHEMA AS CHAR) AS routine_schema,
    CAST(r.ROUTINE_NAME AS CHAR) AS routine_name,
    CAST(r.ROUTINE_COMMENT AS CHAR) AS routine_comment,
    CAST(r.ROUTINE_DEFINITION AS CHAR) AS definition,
    CAST(IF(r.DATA_TYPE IN ('enum', 'set'), r.DTD_IDENTIFIER, r.DATA_TYPE) AS CHAR) AS return_type,
    CAST(r.CHARACTER_MAXIMUM_LENGTH AS SIGNED) AS return_max_length,
    CAST(r.NUMERIC_PRECISION AS SIGNED) AS return_precision,
    CAST(r.NUMERIC_SCALE AS SIGNED) AS return_scale,
    CAST(r.ROUTINE_BODY AS CHAR) AS routine_language,
    r.CREATED AS created_at,
    r.LAST_ALTERED AS updated_at,
    CAST(COALESCE(params.parameters_json, JSON_ARRAY()) AS CHAR) AS parameters_json
FROM information_schema.ROUTINES r
LEFT JOIN (
    SELECT
        p.SPECIFIC_NAME AS specific_name,
        JSON_ARRAYAGG(JSON_OBJECT(
            'name', p.PARAMETER_NAME,
            'ordinal', p.ORDINAL_POSITION,
            'type_name', IF(p.DATA_TYPE IN ('enum', 'set'), p.DTD_IDENTIFIER, p.DATA_TYPE),
            'max_length', p.CHARACTER_MAXIMUM_LENGTH,
            'precision', p.NUMERIC_PRECISION,
            'scale', p.NUMERIC_SCALE,
            'mode', p.PARAMETER_MODE
        )) AS parameters_json
    FROM information_schema.PARAMETERS p
    WHERE p.SPECIFIC_SCHEMA = DATABASE()
        AND p.ROUTINE_TYPE = ?
        AND p.ORDINAL_POSITION > 0
    GROUP BY p.SPECIFIC_NAME
) params ON params.specific_name = r.SPECIFIC_NAME
WHERE r.ROUTINE_SCHEMA = DATABASE()
    AND r.ROUTINE_TYPE = ?
ORDER BY r.ROUTINE_NAME";

const TRIGGERS_QUERY: &str = r"
SELECT
    CAST(TRIGGER_SCHEMA AS CHAR) AS trigger_schema,
    CAST(TRIGGER_NAME AS CHAR) AS trigger_name,
    CAST(EVENT_OBJECT_TABLE AS CHAR) AS table_name,
    CAST(ACTION_TIMING AS CHAR) AS timing,
    CAST(EVENT_MANIPULATION AS CHAR) AS event,
    CAST(ACTION_STATEMENT AS CHAR) AS definition,
    CREATED AS created_at
FROM information_schema.TRIGGERS
WHERE TRIGGER_SCHEMA = DATABASE()
ORDER BY TRIGGER_NAME";

/// `information_schema` timestamps are DATETIME values in server time,
/// which the session pins to UTC.
fn utc(value: Option<NaiveDateTime>) -> Option<DateTime<Utc>> {
    value.map(|timestamp| timestamp.and_utc())
}

fn table_from_row(row: &MySqlRow) -> sqlx::Result<TableRecord> {
    let columns: Option<String> = row.try_get("columns_json")?;
    let indexes: Option<String> = row.try_get("indexes_json")?;
    let relations: Option<String> = row.try_get("relations_json")?;

    PackedTable {
        schema: row.try_get("table_schema")?,
        name: row.try_get("table_name")?,
        comment: row.try_get("table_comment")?,
        columns: columns.as_deref(),
        indexes: indexes.as_deref(),
        relations: relations.as_deref(),
    }
    .assemble(&Standard)
}

fn view_from_row(row: &MySqlRow) -> sqlx::Result<ViewRecord> {
    let columns: Option<String> = row.try_get("columns_json")?;
    Ok(ViewRecord {
        schema: row.try_get("view_schema")?,
        name: row.try_get("view_name")?,
        comment: non_empty(row.try_get("view_comment")?),
        definition: row.try_get("definition")?,
        created_at: utc(row.try_get("created_at")?),
        updated_at: utc(row.try_get("updated_at")?),
        columns: decode_columns(columns.as_deref(), &Standard)?,
    })
}

fn routine_from_row(row: &MySqlRow) -> sqlx::Result<RoutineRecord> {
    let parameters: Option<String> = row.try_get("parameters_json")?;
    let return_type: Option<String> = row.try_get("return_type")?;
    let max_length: Option<i64> = row.try_get("return_max_length")?;
    let precision: Option<i64> = row.try_get("return_precision")?;
    let scale: Option<i64> = row.try_get("return_scale")?;
    let return_type = non_empty(return_type)
        .map(|type_name| format_type(Some(&type_name), max_length, precision, scale));

    Ok(RoutineRecord {
        schema: row.try_get("routine_schema")?,
        name: row.try_get("routine_name")?,
        comment: non_empty(row.try_get("routine_comment")?),
        definition: row.try_get("definition")?,
        return_type,
        language: row.try_get("routine_language")?,
        created_at: utc(row.try_get("created_at")?),
        updated_at: utc(row.try_get("updated_at")?),
        parameters: decode_parameters(parameters.as_deref(), &Standard)?,
    })
}

fn trigger_from_row(row: &MySqlRow) -> sqlx::Result<TriggerRecord> {
    let timing: String = row.try_get("timing")?;
    let event: String = row.try_get("event")?;
    Ok(TriggerRecord {
        schema: row.try_get("trigger_schema")?,
        name: row.try_get("trigger_name")?,
        table_name: row.try_get("table_name")?,
        timing: TriggerTiming::parse(&timing),
        events: TriggerEvent::parse(&event).into_iter().collect(),
        definition: row.try_get("definition")?,
        comment: None,
        enabled: true,
        created_at: utc(row.try_get("created_at")?),
        updated_at: None,
    })
}

fn decode_rows<T>(
    rows: &[MySqlRow],
    decode: fn(&MySqlRow) -> sqlx::Result<T>,
    class: ObjectClass,
) -> Result<Vec<T>> {
    rows.iter()
        .map(decode)
        .collect::<sqlx::Result<Vec<_>>>()
        .map_err(|e| SchemaDocError::from_catalog_query(Dialect::Mysql, class, e))
}

pub(crate) async fn list_tables(adapter: &MySqlAdapter) -> Result<Vec<TableRecord>> {
    let rows = sqlx::query(&tables_query())
        .fetch_all(&adapter.pool)
        .await
        .map_err(|e| SchemaDocError::from_catalog_query(Dialect::Mysql, ObjectClass::Tables, e))?;

    let tables = decode_rows(&rows, table_from_row, ObjectClass::Tables)?;
    tracing::debug!(count = tables.len(), "Extracted MySQL tables");
    Ok(tables)
}

pub(crate) async fn list_views(adapter: &MySqlAdapter) -> Result<Vec<ViewRecord>> {
    let rows = sqlx::query(&views_query())
        .fetch_all(&adapter.pool)
        .await
        .map_err(|e| SchemaDocError::from_catalog_query(Dialect::Mysql, ObjectClass::Views, e))?;

    let views = decode_rows(&rows, view_from_row, ObjectClass::Views)?;
    tracing::debug!(count = views.len(), "Extracted MySQL views");
    Ok(views)
}

pub(crate) async fn list_routines(
    adapter: &MySqlAdapter,
    kind: RoutineKind,
) -> Result<Vec<RoutineRecord>> {
    let class = kind.object_class();
    let rows = sqlx::query(ROUTINES_QUERY)
        .bind(kind.routine_type())
        .bind(kind.routine_type())
        .fetch_all(&adapter.pool)
        .await
        .map_err(|e| SchemaDocError::from_catalog_query(Dialect::Mysql, class, e))?;

    let routines = decode_rows(&rows, routine_from_row, class)?;
    tracing::debug!(count = routines.len(), object_class = %class, "Extracted MySQL routines");
    Ok(routines)
}

pub(crate) async fn list_triggers(adapter: &MySqlAdapter) -> Result<Vec<TriggerRecord>> {
    let rows = sqlx::query(TRIGGERS_QUERY)
        .fetch_all(&adapter.pool)
        .await
        .map_err(|e| {
            SchemaDocError::from_catalog_query(Dialect::Mysql, ObjectClass::Triggers, e)
        })?;

    let triggers = decode_rows(&rows, trigger_from_row, ObjectClass::Triggers)?;
    tracing::debug!(count = triggers.len(), "Extracted MySQL triggers");
    Ok(triggers)
}
