//! Unit tests for the PostgreSQL adapter that need no server.

use super::PostgresAdapter;
use super::connection::{major_version_from_setting, pg_connect_options, session_statements};
use super::extraction::{
    first_overload_only, function_filter, routines_query, tables_query, triggers_query,
};
use crate::config::SourceConfig;
use crate::error::SchemaDocError;
use crate::models::{Dialect, ObjectClass, RoutineRecord};
use crate::security::Credentials;
use std::time::Duration;

fn routine(name: &str, definition: &str) -> RoutineRecord {
    RoutineRecord {
        schema: Some("public".to_string()),
        name: name.to_string(),
        comment: None,
        definition: Some(definition.to_string()),
        return_type: Some("integer".to_string()),
        language: Some("sql".to_string()),
        created_at: None,
        updated_at: None,
        parameters: Vec::new(),
    }
}

#[test]
fn test_connect_options_from_config() {
    let config = SourceConfig::new(Dialect::Pgsql, "db.internal".to_string())
        .with_database("shop".to_string());
    let credentials = Credentials::new("docs".to_string(), Some("secret".to_string()));
    let options = pg_connect_options(&config, &credentials);

    assert_eq!(options.get_host(), "db.internal");
    assert_eq!(options.get_port(), 5432);
    assert_eq!(options.get_username(), "docs");
    assert_eq!(options.get_database(), Some("shop"));
    assert!(
        options
            .get_application_name()
            .is_some_and(|name| name.starts_with("schemadoc-sync-"))
    );
}

#[test]
fn test_session_statements_are_read_only() {
    let config = SourceConfig::new(Dialect::Pgsql, "localhost".to_string())
        .with_query_timeout(Duration::from_secs(5));
    let statements = session_statements(&config);

    assert_eq!(statements[0], "SET statement_timeout = 5000");
    assert!(statements.contains(&"SET default_transaction_read_only = on".to_string()));
}

#[test]
fn test_function_filter_by_version() {
    assert_eq!(function_filter(16), "p.prokind = 'f'");
    assert_eq!(function_filter(11), "p.prokind = 'f'");
    assert!(function_filter(10).contains("proisagg"));
    assert!(routines_query(function_filter(10)).contains("NOT p.proiswindow"));
}

#[test]
fn test_tables_query_excludes_system_schemas() {
    let query = tables_query();
    assert!(query.contains("'pg_catalog', 'information_schema'"));
    assert!(query.contains("c.relkind IN ('r', 'p')"));
}

#[test]
fn test_triggers_query_excludes_system_and_extension_tables() {
    let query = triggers_query();
    assert!(query.contains("'pg_catalog', 'information_schema'"));
    assert!(query.contains("NOT LIKE 'pg_temp%'"));
    assert!(query.contains("dep.objid IN (t.oid, c.oid) AND dep.deptype = 'e'"));
    assert!(query.contains("NOT t.tgisinternal"));
}

#[test]
fn test_first_overload_only() {
    let routines = vec![
        routine("area", "first"),
        routine("perimeter", "only"),
        routine("area", "second"),
    ];
    let kept = first_overload_only(routines, ObjectClass::Functions);

    assert_eq!(kept.len(), 2);
    assert_eq!(kept[0].definition.as_deref(), Some("first"));
    assert_eq!(kept[1].name, "perimeter");
}

#[test]
fn test_unrecognized_server_version_is_extraction_error() {
    assert_eq!(major_version_from_setting("170004", ObjectClass::Functions).unwrap(), 17);

    let err = major_version_from_setting("PostgreSQL 17.4", ObjectClass::Procedures).unwrap_err();
    assert!(matches!(
        err,
        SchemaDocError::Extraction {
            dialect: Dialect::Pgsql,
            object_class: ObjectClass::Procedures,
            ..
        }
    ));
    assert!(!err.is_fatal());
}

#[tokio::test]
async fn test_server_version_unreachable_is_connection_error() {
    let mut config = SourceConfig::new(Dialect::Pgsql, "127.0.0.1".to_string()).with_port(1);
    config.connect_timeout = Duration::from_secs(1);
    let credentials = Credentials::new("docs".to_string(), None);
    let adapter = PostgresAdapter::connect(&config, &credentials).await.unwrap();

    let err = adapter
        .server_major_version(ObjectClass::Functions)
        .await
        .unwrap_err();
    assert!(err.is_fatal());
}
