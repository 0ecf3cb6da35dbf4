//! PostgreSQL catalog extraction.
//!
//! Queries read `pg_catalog` directly. Per-object children are built with
//! correlated `json_agg` subqueries and returned as text.

use super::PostgresAdapter;
use super::type_mapping::{PgSpelling, parse_trigger_type};
use crate::Result;
use crate::adapters::packed::{PackedTable, decode_columns, decode_parameters, non_empty};
use crate::error::SchemaDocError;
use crate::models::{Dialect, ObjectClass, RoutineRecord, TableRecord, TriggerRecord, ViewRecord};
use sqlx::Row;
use sqlx::postgres::PgRow;
use std::collections::HashSet;

/// Excludes system schemas from any query aliasing `pg_namespace` as `n`.
const USER_SCHEMAS: &str = "n.nspname NOT IN ('pg_catalog', 'information_schema') \
     AND n.nspname NOT LIKE 'pg_toast%' AND n.nspname NOT LIKE 'pg_temp%'";

/// Column payload of the relation `c`. Lengths and numeric precision are
/// decoded from `atttypmod`, which carries a 4 byte header.
const COLUMNS_PAYLOAD: &str = r"
    COALESCE((
        SELECT json_agg(json_build_object(
            'name', a.attname,
            'ordinal', a.attnum,
            'type_name', t.typname,
            'max_length', CASE
                WHEN t.typname IN ('varchar', 'bpchar') AND a.atttypmod > 4
                THEN a.atttypmod - 4
            END,
            'precision', CASE
                WHEN t.typname = 'numeric' AND a.atttypmod > 4
                THEN ((a.atttypmod - 4) >> 16) & 65535
            END,
            'scale', CASE
                WHEN t.typname = 'numeric' AND a.atttypmod > 4
                THEN (a.atttypmod - 4) & 65535
            END,
            'nullable', NOT a.attnotnull,
            'default_value', pg_get_expr(d.adbin, d.adrelid),
            'comment', col_description(c.oid, a.attnum)
        ) ORDER BY a.attnum)
        FROM pg_attribute a
        JOIN pg_type t ON t.oid = a.atttypid
        LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
        WHERE a.attrelid = c.oid AND a.attnum > 0 AND NOT a.attisdropped
    ), '[]'::json)::text";

pub(crate) fn tables_query() -> String {
    format!(
        r"
SELECT
    n.nspname::text AS table_schema,
    c.relname::text AS table_name,
    obj_description(c.oid, 'pg_class')::text AS table_comment,
    {COLUMNS_PAYLOAD} AS columns_json,
    COALESCE((
        SELECT json_agg(json_build_object(
            'name', ic.relname,
            'index_type', am.amname,
            'column_list', (
                SELECT string_agg(ia.attname, ',' ORDER BY k.ord)
                FROM unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
                JOIN pg_attribute ia ON ia.attrelid = c.oid AND ia.attnum = k.attnum
            ),
            'is_primary', ix.indisprimary,
            'is_unique', ix.indisunique
        ))
        FROM pg_index ix
        JOIN pg_class ic ON ic.oid = ix.indexrelid
        JOIN pg_am am ON am.oid = ic.relam
        WHERE ix.indrelid = c.oid
    ), '[]'::json)::text AS indexes_json,
    COALESCE((
        SELECT json_agg(json_build_object(
            'constraint_name', con.conname,
            'position', k.ord,
            'column_name', sa.attname,
            'referenced_table', rc.relname,
            'referenced_column', ra.attname,
            'on_delete', con.confdeltype,
            'on_update', con.confupdtype
        ))
        FROM pg_constraint con
        CROSS JOIN LATERAL unnest(con.conkey, con.confkey) WITH ORDINALITY AS k(attnum, refnum, ord)
        JOIN pg_attribute sa ON sa.attrelid = con.conrelid AND sa.attnum = k.attnum
        JOIN pg_class rc ON rc.oid = con.confrelid
        JOIN pg_attribute ra ON ra.attrelid = con.confrelid AND ra.attnum = k.refnum
        WHERE con.conrelid = c.oid AND con.contype = 'f'
    ), '[]'::json)::text AS relations_json
FROM pg_class c
JOIN pg_namespace n ON n.oid = c.relnamespace
WHERE c.relkind IN ('r', 'p')
    AND {USER_SCHEMAS}
ORDER BY c.relname, n.nspname"
    )
}

pub(crate) fn views_query() -> String {
    format!(
        r"
SELECT
    n.nspname::text AS view_schema,
    c.relname::text AS view_name,
    obj_description(c.oid, 'pg_class')::text AS view_comment,
    pg_get_viewdef(c.oid, true)::text AS definition,
    {COLUMNS_PAYLOAD} AS columns_json
FROM pg_class c
JOIN pg_namespace n ON n.oid = c.relnamespace
WHERE c.relkind IN ('v', 'm')
    AND {USER_SCHEMAS}
    AND NOT EXISTS (
        SELECT 1 FROM pg_depend dep
        WHERE dep.objid = c.oid AND dep.deptype = 'e'
    )
ORDER BY c.relname, n.nspname"
    )
}

/// Routine query; `kind_filter` restricts `pg_proc` rows by routine kind.
pub(crate) fn routines_query(kind_filter: &str) -> String {
    format!(
        r"
SELECT
    n.nspname::text AS routine_schema,
    p.proname::text AS routine_name,
    obj_description(p.oid, 'pg_proc')::text AS routine_comment,
    pg_get_functiondef(p.oid)::text AS definition,
    pg_get_function_result(p.oid)::text AS return_type,
    l.lanname::text AS routine_language,
    COALESCE((
        SELECT json_agg(json_build_object(
            'name', p.proargnames[u.ord::int],
            'ordinal', u.ord,
            'type_name', pt.typname,
            'mode', COALESCE(p.proargmodes[u.ord::int]::text, 'i')
        ) ORDER BY u.ord)
        FROM unnest(COALESCE(p.proallargtypes, p.proargtypes::oid[]))
            WITH ORDINALITY AS u(type_oid, ord)
        JOIN pg_type pt ON pt.oid = u.type_oid
    ), '[]'::json)::text AS parameters_json
FROM pg_proc p
JOIN pg_namespace n ON n.oid = p.pronamespace
JOIN pg_language l ON l.oid = p.prolang
WHERE {kind_filter}
    AND {USER_SCHEMAS}
    AND NOT EXISTS (
        SELECT 1 FROM pg_depend dep
        WHERE dep.objid = p.oid AND dep.deptype = 'e'
    )
ORDER BY p.proname, p.oid"
    )
}

/// Functions filter by server version; `prokind` exists from 11 on.
pub(crate) fn function_filter(major_version: u32) -> &'static str {
    if major_version >= 11 {
        "p.prokind = 'f'"
    } else {
        "NOT p.proisagg AND NOT p.proiswindow"
    }
}

/// Triggers on user tables. Triggers on tables that an extension owns are
/// left out, like the extension's own routines.
pub(crate) fn triggers_query() -> String {
    format!(
        r"
SELECT
    n.nspname::text AS trigger_schema,
    t.tgname::text AS trigger_name,
    c.relname::text AS table_name,
    t.tgtype::integer AS trigger_type,
    pg_get_triggerdef(t.oid, true)::text AS definition,
    obj_description(t.oid, 'pg_trigger')::text AS trigger_comment,
    t.tgenabled <> 'D' AS enabled
FROM pg_trigger t
JOIN pg_class c ON c.oid = t.tgrelid
JOIN pg_namespace n ON n.oid = c.relnamespace
WHERE NOT t.tgisinternal
    AND {USER_SCHEMAS}
    AND NOT EXISTS (
        SELECT 1 FROM pg_depend dep
        WHERE dep.objid IN (t.oid, c.oid) AND dep.deptype = 'e'
    )
ORDER BY t.tgname, c.relname"
    )
}

fn table_from_row(row: &PgRow) -> sqlx::Result<TableRecord> {
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
    .assemble(&PgSpelling)
}

fn view_from_row(row: &PgRow) -> sqlx::Result<ViewRecord> {
    let columns: Option<String> = row.try_get("columns_json")?;
    Ok(ViewRecord {
        schema: row.try_get("view_schema")?,
        name: row.try_get("view_name")?,
        comment: non_empty(row.try_get("view_comment")?),
        definition: row.try_get("definition")?,
        created_at: None,
        updated_at: None,
        columns: decode_columns(columns.as_deref(), &PgSpelling)?,
    })
}

fn routine_from_row(row: &PgRow) -> sqlx::Result<RoutineRecord> {
    let parameters: Option<String> = row.try_get("parameters_json")?;
    Ok(RoutineRecord {
        schema: row.try_get("routine_schema")?,
        name: row.try_get("routine_name")?,
        comment: non_empty(row.try_get("routine_comment")?),
        definition: row.try_get("definition")?,
        return_type: non_empty(row.try_get("return_type")?),
        language: row.try_get("routine_language")?,
        created_at: None,
        updated_at: None,
        parameters: decode_parameters(parameters.as_deref(), &PgSpelling)?,
    })
}

fn trigger_from_row(row: &PgRow) -> sqlx::Result<TriggerRecord> {
    let (timing, events) = parse_trigger_type(row.try_get("trigger_type")?);
    Ok(TriggerRecord {
        schema: row.try_get("trigger_schema")?,
        name: row.try_get("trigger_name")?,
        table_name: row.try_get("table_name")?,
        timing,
        events,
        definition: row.try_get("definition")?,
        comment: non_empty(row.try_get("trigger_comment")?),
        enabled: row.try_get("enabled")?,
        created_at: None,
        updated_at: None,
    })
}

/// Keeps the first routine of each name.
///
/// The repository keys routines by name, so only one overload can be
/// documented; the rest are dropped with a warning.
pub(crate) fn first_overload_only(
    routines: Vec<RoutineRecord>,
    class: ObjectClass,
) -> Vec<RoutineRecord> {
    let mut seen = HashSet::new();
    routines
        .into_iter()
        .filter(|routine| {
            let first = seen.insert(routine.name.clone());
            if !first {
                tracing::warn!(
                    object_class = %class,
                    object_name = %routine.name,
                    "Skipping overloaded PostgreSQL routine; only the first overload is documented"
                );
            }
            first
        })
        .collect()
}

async fn fetch_decoded<T>(
    adapter: &PostgresAdapter,
    query: &str,
    decode: fn(&PgRow) -> sqlx::Result<T>,
    class: ObjectClass,
) -> Result<Vec<T>> {
    let rows = sqlx::query(query)
        .fetch_all(&adapter.pool)
        .await
        .map_err(|e| SchemaDocError::from_catalog_query(Dialect::Pgsql, class, e))?;

    rows.iter()
        .map(decode)
        .collect::<sqlx::Result<Vec<_>>>()
        .map_err(|e| SchemaDocError::from_catalog_query(Dialect::Pgsql, class, e))
}

pub(crate) async fn list_tables(adapter: &PostgresAdapter) -> Result<Vec<TableRecord>> {
    let tables =
        fetch_decoded(adapter, &tables_query(), table_from_row, ObjectClass::Tables).await?;
    tracing::debug!(count = tables.len(), "Extracted PostgreSQL tables");
    Ok(tables)
}

pub(crate) async fn list_views(adapter: &PostgresAdapter) -> Result<Vec<ViewRecord>> {
    let views = fetch_decoded(adapter, &views_query(), view_from_row, ObjectClass::Views).await?;
    tracing::debug!(count = views.len(), "Extracted PostgreSQL views");
    Ok(views)
}

pub(crate) async fn list_functions(adapter: &PostgresAdapter) -> Result<Vec<RoutineRecord>> {
    let class = ObjectClass::Functions;
    let major_version = adapter.server_major_version(class).await?;

    let query = routines_query(function_filter(major_version));
    let functions = fetch_decoded(adapter, &query, routine_from_row, class).await?;
    let functions = first_overload_only(functions, class);
    tracing::debug!(count = functions.len(), "Extracted PostgreSQL functions");
    Ok(functions)
}

pub(crate) async fn list_procedures(adapter: &PostgresAdapter) -> Result<Vec<RoutineRecord>> {
    let class = ObjectClass::Procedures;
    let major_version = adapter.server_major_version(class).await?;

    if major_version < 11 {
        tracing::info!(
            major_version,
            "PostgreSQL version does not support procedures (requires 11+)"
        );
        return Ok(Vec::new());
    }

    let query = routines_query("p.prokind = 'p'");
    let procedures = fetch_decoded(adapter, &query, routine_from_row, class).await?;
    let procedures = first_overload_only(procedures, class);
    tracing::debug!(count = procedures.len(), "Extracted PostgreSQL procedures");
    Ok(procedures)
}

pub(crate) async fn list_triggers(adapter: &PostgresAdapter) -> Result<Vec<TriggerRecord>> {
    let query = triggers_query();
    let triggers = fetch_decoded(adapter, &query, trigger_from_row, ObjectClass::Triggers).await?;
    tracing::debug!(count = triggers.len(), "Extracted PostgreSQL triggers");
    Ok(triggers)
}
