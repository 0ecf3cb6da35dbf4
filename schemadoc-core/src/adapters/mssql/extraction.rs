//! SQL Server catalog extraction.
//!
//! Queries read the `sys.*` catalog views of the connected database. Child
//! collections are correlated `FOR JSON PATH` sub-selects, which return a
//! single `nvarchar(max)` value per object; `FOR JSON` omits NULL keys, so
//! the packed decoders default every optional field. Comments come from the
//! `MS_Description` extended property.

use super::MssqlAdapter;
use crate::Result;
use crate::adapters::packed::{
    PackedTable, Standard, decode_columns, decode_parameters, non_empty, parse_event_list,
};
use crate::error::SchemaDocError;
use crate::models::{
    Dialect, ObjectClass, RoutineRecord, TableRecord, TriggerRecord, TriggerTiming, ViewRecord,
};
use crate::type_format::format_type;
use chrono::{DateTime, NaiveDateTime, Utc};
use tiberius::Row;

type Decoded<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// `sys.objects.type` codes of one routine class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RoutineKind {
    Function,
    Procedure,
}

impl RoutineKind {
    /// Scalar, inline table-valued and multi-statement table-valued
    /// functions; CLR routines are skipped.
    pub(crate) fn type_codes(self) -> &'static str {
        match self {
            RoutineKind::Function => "'FN', 'IF', 'TF'",
            RoutineKind::Procedure => "'P'",
        }
    }

    fn object_class(self) -> ObjectClass {
        match self {
            RoutineKind::Function => ObjectClass::Functions,
            RoutineKind::Procedure => ObjectClass::Procedures,
        }
    }
}

/// `MS_Description` of the object `major` (column `minor`, 0 for the object).
fn description_join(alias: &str, major: &str, minor: &str) -> String {
    format!(
        "LEFT JOIN sys.extended_properties {alias} \
         ON {alias}.class = 1 AND {alias}.major_id = {major} \
         AND {alias}.minor_id = {minor} AND {alias}.name = 'MS_Description'"
    )
}

/// Column payload of the object `o`. `max_length` is in bytes.
const COLUMNS_PAYLOAD: &str = r"
    ISNULL((
        SELECT
            c.name AS [name],
            c.column_id AS ordinal,
            ty.name AS type_name,
            c.max_length AS max_length,
            c.precision AS [precision],
            c.scale AS scale,
            c.is_nullable AS nullable,
            dc.definition AS default_value,
            CAST(cep.value AS nvarchar(max)) AS comment
        FROM sys.columns c
        JOIN sys.types ty ON ty.user_type_id = c.user_type_id
        LEFT JOIN sys.default_constraints dc ON dc.object_id = c.default_object_id
        LEFT JOIN sys.extended_properties cep
            ON cep.class = 1 AND cep.major_id = c.object_id
            AND cep.minor_id = c.column_id AND cep.name = 'MS_Description'
        WHERE c.object_id = o.object_id
        ORDER BY c.column_id
        FOR JSON PATH
    ), '[]')";

pub(crate) fn tables_query() -> String {
    let comment = description_join("ep", "o.object_id", "0");
    format!(
        r"
SELECT
    s.name AS table_schema,
    o.name AS table_name,
    CAST(ep.value AS nvarchar(max)) AS table_comment,
    {COLUMNS_PAYLOAD} AS columns_json,
    ISNULL((
        SELECT
            i.name AS [name],
            i.type_desc AS index_type,
            STUFF((
                SELECT ',' + icol.name
                FROM sys.index_columns ic
                JOIN sys.columns icol
                    ON icol.object_id = ic.object_id AND icol.column_id = ic.column_id
                WHERE ic.object_id = i.object_id
                    AND ic.index_id = i.index_id
                    AND ic.is_included_column = 0
                ORDER BY ic.key_ordinal
                FOR XML PATH(''), TYPE
            ).value('.', 'nvarchar(max)'), 1, 1, '') AS column_list,
            i.is_primary_key AS is_primary,
            i.is_unique AS is_unique
        FROM sys.indexes i
        WHERE i.object_id = o.object_id AND i.type > 0 AND i.is_hypothetical = 0
        FOR JSON PATH
    ), '[]') AS indexes_json,
    ISNULL((
        SELECT
            fk.name AS constraint_name,
            fkc.constraint_column_id AS position,
            pc.name AS column_name,
            rt.name AS referenced_table,
            rc.name AS referenced_column,
            fk.delete_referential_action_desc AS on_delete,
            fk.update_referential_action_desc AS on_update
        FROM sys.foreign_keys fk
        JOIN sys.foreign_key_columns fkc ON fkc.constraint_object_id = fk.object_id
        JOIN sys.columns pc
            ON pc.object_id = fkc.parent_object_id AND pc.column_id = fkc.parent_column_id
        JOIN sys.objects rt ON rt.object_id = fkc.referenced_object_id
        JOIN sys.columns rc
            ON rc.object_id = fkc.referenced_object_id
            AND rc.column_id = fkc.referenced_column_id
        WHERE fk.parent_object_id = o.object_id
        FOR JSON PATH
    ), '[]') AS relations_json
FROM sys.tables o
JOIN sys.schemas s ON s.schema_id = o.schema_id
{comment}
WHERE o.is_ms_shipped = 0
ORDER BY o.name, s.name"
    )
}

pub(crate) fn views_query() -> String {
    let comment = description_join("ep", "o.object_id", "0");
    format!(
        r"
SELECT
    s.name AS view_schema,
    o.name AS view_name,
    CAST(ep.value AS nvarchar(max)) AS view_comment,
    m.definition AS definition,
    o.create_date AS created_at,
    o.modify_date AS updated_at,
    {COLUMNS_PAYLOAD} AS columns_json
FROM sys.views o
JOIN sys.schemas s ON s.schema_id = o.schema_id
LEFT JOIN sys.sql_modules m ON m.object_id = o.object_id
{comment}
WHERE o.is_ms_shipped = 0
ORDER BY o.name, s.name"
    )
}

/// Routine query; the scalar return type is parameter 0.
pub(crate) fn routines_query(kind: RoutineKind) -> String {
    let comment = description_join("ep", "o.object_id", "0");
    let type_codes = kind.type_codes();
    format!(
        r"
SELECT
    s.name AS routine_schema,
    o.name AS routine_name,
    CAST(ep.value AS nvarchar(max)) AS routine_comment,
    m.definition AS definition,
    CASE WHEN o.type IN ('IF', 'TF') THEN N'table' ELSE rt.name END AS return_type,
    CAST(rp.max_length AS int) AS return_max_length,
    CAST(rp.precision AS int) AS return_precision,
    CAST(rp.scale AS int) AS return_scale,
    N'SQL' AS routine_language,
    o.create_date AS created_at,
    o.modify_date AS updated_at,
    ISNULL((
        SELECT
            p.name AS [name],
            p.parameter_id AS ordinal,
            pt.name AS type_name,
            p.max_length AS max_length,
            p.precision AS [precision],
            p.scale AS scale,
            CASE WHEN p.is_output = 1 THEN 'OUT' ELSE 'IN' END AS mode
        FROM sys.parameters p
        JOIN sys.types pt ON pt.user_type_id = p.user_type_id
        WHERE p.object_id = o.object_id AND p.parameter_id > 0
        ORDER BY p.parameter_id
        FOR JSON PATH
    ), '[]') AS parameters_json
FROM sys.objects o
JOIN sys.schemas s ON s.schema_id = o.schema_id
LEFT JOIN sys.sql_modules m ON m.object_id = o.object_id
LEFT JOIN sys.parameters rp ON rp.object_id = o.object_id AND rp.parameter_id = 0
LEFT JOIN sys.types rt ON rt.user_type_id = rp.user_type_id
{comment}
WHERE o.type IN ({type_codes})
    AND o.is_ms_shipped = 0
ORDER BY o.name, s.name"
    )
}

pub(crate) fn triggers_query() -> String {
    let comment = description_join("ep", "tr.object_id", "0");
    format!(
        r"
SELECT
    s.name AS trigger_schema,
    tr.name AS trigger_name,
    po.name AS table_name,
    CASE WHEN tr.is_instead_of_trigger = 1 THEN N'INSTEAD OF' ELSE N'AFTER' END AS timing,
    STUFF((
        SELECT ',' + te.type_desc
        FROM sys.trigger_events te
        WHERE te.object_id = tr.object_id
        FOR XML PATH(''), TYPE
    ).value('.', 'nvarchar(max)'), 1, 1, '') AS events,
    m.definition AS definition,
    CAST(ep.value AS nvarchar(max)) AS trigger_comment,
    CAST(CASE WHEN tr.is_disabled = 1 THEN 0 ELSE 1 END AS bit) AS enabled,
    tr.create_date AS created_at,
    tr.modify_date AS updated_at
FROM sys.triggers tr
JOIN sys.objects po ON po.object_id = tr.parent_id
JOIN sys.schemas s ON s.schema_id = po.schema_id
LEFT JOIN sys.sql_modules m ON m.object_id = tr.object_id
{comment}
WHERE tr.parent_class = 1 AND tr.is_ms_shipped = 0
ORDER BY tr.name, po.name"
    )
}

fn text(row: &Row, column: &str) -> Decoded<Option<String>> {
    Ok(row.try_get::<&str, _>(column)?.map(str::to_string))
}

fn required_text(row: &Row, column: &str) -> Decoded<String> {
    text(row, column)?.ok_or_else(|| format!("column '{column}' is NULL").into())
}

fn integer(row: &Row, column: &str) -> Decoded<Option<i64>> {
    Ok(row.try_get::<i32, _>(column)?.map(i64::from))
}

/// `create_date`/`modify_date` are server local `datetime` values.
fn timestamp(row: &Row, column: &str) -> Decoded<Option<DateTime<Utc>>> {
    Ok(row
        .try_get::<NaiveDateTime, _>(column)?
        .map(|value| value.and_utc()))
}

fn table_from_row(row: &Row) -> Decoded<TableRecord> {
    let columns = text(row, "columns_json")?;
    let indexes = text(row, "indexes_json")?;
    let relations = text(row, "relations_json")?;

    Ok(PackedTable {
        schema: text(row, "table_schema")?,
        name: required_text(row, "table_name")?,
        comment: text(row, "table_comment")?,
        columns: columns.as_deref(),
        indexes: indexes.as_deref(),
        relations: relations.as_deref(),
    }
    .assemble(&Standard)?)
}

fn view_from_row(row: &Row) -> Decoded<ViewRecord> {
    let columns = text(row, "columns_json")?;
    Ok(ViewRecord {
        schema: text(row, "view_schema")?,
        name: required_text(row, "view_name")?,
        comment: non_empty(text(row, "view_comment")?),
        definition: text(row, "definition")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
        columns: decode_columns(columns.as_deref(), &Standard)?,
    })
}

fn routine_from_row(row: &Row) -> Decoded<RoutineRecord> {
    let parameters = text(row, "parameters_json")?;
    let max_length = integer(row, "return_max_length")?;
    let precision = integer(row, "return_precision")?;
    let scale = integer(row, "return_scale")?;
    let return_type = non_empty(text(row, "return_type")?)
        .map(|type_name| format_type(Some(&type_name), max_length, precision, scale));

    Ok(RoutineRecord {
        schema: text(row, "routine_schema")?,
        name: required_text(row, "routine_name")?,
        comment: non_empty(text(row, "routine_comment")?),
        definition: text(row, "definition")?,
        return_type,
        language: text(row, "routine_language")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
        parameters: decode_parameters(parameters.as_deref(), &Standard)?,
    })
}

fn trigger_from_row(row: &Row) -> Decoded<TriggerRecord> {
    let timing = text(row, "timing")?;
    let events = text(row, "events")?;
    Ok(TriggerRecord {
        schema: text(row, "trigger_schema")?,
        name: required_text(row, "trigger_name")?,
        table_name: required_text(row, "table_name")?,
        timing: TriggerTiming::parse(timing.as_deref().unwrap_or_default()),
        events: parse_event_list(events.as_deref()),
        definition: text(row, "definition")?,
        comment: non_empty(text(row, "trigger_comment")?),
        enabled: row.try_get::<bool, _>("enabled")?.unwrap_or(true),
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    })
}

fn decode_rows<T>(
    rows: &[Row],
    decode: fn(&Row) -> Decoded<T>,
    class: ObjectClass,
) -> Result<Vec<T>> {
    rows.iter()
        .map(decode)
        .collect::<Decoded<Vec<_>>>()
        .map_err(|e| SchemaDocError::decode_failed(Dialect::Mssql, class, e))
}

pub(crate) async fn list_tables(adapter: &MssqlAdapter) -> Result<Vec<TableRecord>> {
    let rows = adapter
        .query_catalog(&tables_query(), ObjectClass::Tables)
        .await?;
    let tables = decode_rows(&rows, table_from_row, ObjectClass::Tables)?;
    tracing::debug!(count = tables.len(), "Extracted SQL Server tables");
    Ok(tables)
}

pub(crate) async fn list_views(adapter: &MssqlAdapter) -> Result<Vec<ViewRecord>> {
    let rows = adapter
        .query_catalog(&views_query(), ObjectClass::Views)
        .await?;
    let views = decode_rows(&rows, view_from_row, ObjectClass::Views)?;
    tracing::debug!(count = views.len(), "Extracted SQL Server views");
    Ok(views)
}

pub(crate) async fn list_routines(
    adapter: &MssqlAdapter,
    kind: RoutineKind,
) -> Result<Vec<RoutineRecord>> {
    let class = kind.object_class();
    let rows = adapter.query_catalog(&routines_query(kind), class).await?;
    let routines = decode_rows(&rows, routine_from_row, class)?;
    tracing::debug!(count = routines.len(), object_class = %class, "Extracted SQL Server routines");
    Ok(routines)
}

pub(crate) async fn list_triggers(adapter: &MssqlAdapter) -> Result<Vec<TriggerRecord>> {
    let rows = adapter
        .query_catalog(&triggers_query(), ObjectClass::Triggers)
        .await?;
    let triggers = decode_rows(&rows, trigger_from_row, ObjectClass::Triggers)?;
    tracing::debug!(count = triggers.len(), "Extracted SQL Server triggers");
    Ok(triggers)
}
