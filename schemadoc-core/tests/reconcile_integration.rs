//! Reconciler integration tests against an in-memory repository.
//!
//! This test suite covers:
//! - Idempotent re-synchronization and stable description ids
//! - Exact replacement of columns, indexes and foreign keys
//! - Preservation of user documentation across a re-sync
//! - Rollback of a failed object
//! - Views, routines and triggers with their information rows

use schemadoc_core::{
    ColumnRecord, IndexRecord, KeyKind, ObjectClass, ParameterMode, ParameterRecord,
    Reconciler, RelationRecord, RoutineRecord, SchemaDocError, SchemaObject, SyncConfig,
    TableRecord, TriggerEvent, TriggerRecord, TriggerTiming, ViewRecord,
    models::ReferentialAction, store::Store,
};

fn column(name: &str, ordinal: u32, canonical_type: &str, comment: Option<&str>) -> ColumnRecord {
    ColumnRecord {
        name: name.to_string(),
        ordinal,
        canonical_type: canonical_type.to_string(),
        nullable: true,
        key_kind: KeyKind::None,
        default_value: None,
        comment: comment.map(str::to_string),
    }
}

/// The `orders` table: id INT PK, customer_id INT FK, status VARCHAR(20).
fn orders_table() -> TableRecord {
    let mut table = TableRecord {
        schema: Some("shop".to_string()),
        name: "orders".to_string(),
        comment: Some("Customer orders".to_string()),
        columns: vec![
            column("id", 1, "int", None),
            column("customer_id", 2, "int", Some("Buyer")),
            column("status", 3, "varchar(20)", None),
        ],
        indexes: vec![IndexRecord {
            name: "PRIMARY".to_string(),
            index_type: Some("BTREE".to_string()),
            columns: vec!["id".to_string()],
            is_primary: true,
            is_unique: true,
        }],
        relations: vec![RelationRecord {
            constraint_name: "fk_orders_customer".to_string(),
            column_name: "customer_id".to_string(),
            referenced_table: "customers".to_string(),
            referenced_column: "id".to_string(),
            on_delete: Some(ReferentialAction::Cascade),
            on_update: Some(ReferentialAction::NoAction),
        }],
    };
    table.derive_key_kinds();
    table
}

async fn setup(config: SyncConfig) -> (Reconciler, i64) {
    let store = Store::in_memory().await.unwrap();
    let database_id = store.create_database(1, "shop", None).await.unwrap();
    (Reconciler::new(store, config), database_id)
}

#[tokio::test]
async fn test_orders_table_round_trip() {
    let (reconciler, database_id) = setup(SyncConfig::default()).await;
    let store = reconciler.store().clone();

    let result = reconciler
        .reconcile(database_id, &SchemaObject::Table(orders_table()))
        .await
        .unwrap();
    assert!(result.created);
    assert_eq!(result.children, 5);

    let table = store.table(database_id, "orders").await.unwrap().unwrap();
    assert_eq!(table.id, result.description_id);
    assert_eq!(table.schema_name.as_deref(), Some("shop"));
    assert_eq!(table.description.as_deref(), Some("Customer orders"));
    assert_eq!(table.language, "en");

    let columns = store.columns(table.id).await.unwrap();
    let summary: Vec<_> = columns
        .iter()
        .map(|c| (c.column_name.as_str(), c.canonical_type.as_str(), c.key_kind))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("id", "int", KeyKind::Primary),
            ("customer_id", "int", KeyKind::Foreign),
            ("status", "varchar(20)", KeyKind::None),
        ]
    );
    assert_eq!(columns[1].description.as_deref(), Some("Buyer"));

    let indexes = store.indexes(table.id).await.unwrap();
    assert_eq!(indexes.len(), 1);
    assert_eq!(indexes[0].column_list, "id");
    assert!(indexes[0].is_primary);

    let relations = store.relations(table.id).await.unwrap();
    assert_eq!(relations.len(), 1);
    assert_eq!(relations[0].referenced_table, "customers");
    assert_eq!(relations[0].on_delete_rule.as_deref(), Some("CASCADE"));
    assert_eq!(relations[0].on_update_rule.as_deref(), Some("NO ACTION"));
}

#[tokio::test]
async fn test_reconcile_is_idempotent() {
    let (reconciler, database_id) = setup(SyncConfig::default()).await;
    let store = reconciler.store().clone();
    let object = SchemaObject::Table(orders_table());

    let first = reconciler.reconcile(database_id, &object).await.unwrap();
    let columns_before = store.columns(first.description_id).await.unwrap();

    let second = reconciler.reconcile(database_id, &object).await.unwrap();
    let columns_after = store.columns(second.description_id).await.unwrap();

    assert_eq!(first.description_id, second.description_id);
    assert!(!second.created);
    assert_eq!(store.tables(database_id).await.unwrap().len(), 1);

    let strip = |columns: Vec<schemadoc_core::store::StoredColumn>| {
        columns
            .into_iter()
            .map(|c| (c.ordinal, c.column_name, c.canonical_type, c.nullable, c.key_kind))
            .collect::<Vec<_>>()
    };
    assert_eq!(strip(columns_before), strip(columns_after));
    assert_eq!(store.orphan_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_children_are_replaced_exactly() {
    let (reconciler, database_id) = setup(SyncConfig::default()).await;
    let store = reconciler.store().clone();

    let mut table = orders_table();
    let first = reconciler
        .reconcile(database_id, &SchemaObject::Table(table.clone()))
        .await
        .unwrap();

    // status dropped, placed_at added, foreign key removed
    table.columns.retain(|c| c.name != "status");
    table.columns.push(column("placed_at", 3, "datetime", None));
    table.relations.clear();
    table.derive_key_kinds();

    let second = reconciler
        .reconcile(database_id, &SchemaObject::Table(table))
        .await
        .unwrap();
    assert_eq!(first.description_id, second.description_id);

    let names: Vec<_> = store
        .columns(second.description_id)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.column_name)
        .collect();
    assert_eq!(names, vec!["id", "customer_id", "placed_at"]);
    assert!(store.relations(second.description_id).await.unwrap().is_empty());

    let columns = store.columns(second.description_id).await.unwrap();
    assert_eq!(columns[1].key_kind, KeyKind::None);
}

#[tokio::test]
async fn test_user_documentation_survives_resync() {
    let (reconciler, database_id) = setup(SyncConfig::default()).await;
    let store = reconciler.store().clone();

    let mut table = orders_table();
    table.comment = None;
    let result = reconciler
        .reconcile(database_id, &SchemaObject::Table(table.clone()))
        .await
        .unwrap();
    let table_id = result.description_id;

    assert!(
        store
            .set_description(ObjectClass::Tables, table_id, Some("Every order ever placed"))
            .await
            .unwrap()
    );
    assert!(
        store
            .set_column_documentation(
                table_id,
                "status",
                Some("Fulfilment state"),
                Some("NEW,PAID,SHIPPED"),
                Some(7),
            )
            .await
            .unwrap()
    );

    reconciler
        .reconcile(database_id, &SchemaObject::Table(table))
        .await
        .unwrap();

    let stored = store.table(database_id, "orders").await.unwrap().unwrap();
    assert_eq!(stored.id, table_id);
    assert_eq!(stored.description.as_deref(), Some("Every order ever placed"));

    let status = store
        .columns(table_id)
        .await
        .unwrap()
        .into_iter()
        .find(|c| c.column_name == "status")
        .unwrap();
    assert_eq!(status.description.as_deref(), Some("Fulfilment state"));
    assert_eq!(status.allowed_values.as_deref(), Some("NEW,PAID,SHIPPED"));
    assert_eq!(status.release_id, Some(7));
}

#[tokio::test]
async fn test_source_comment_overrides_stored_description() {
    let (reconciler, database_id) = setup(SyncConfig::default()).await;
    let store = reconciler.store().clone();

    let result = reconciler
        .reconcile(database_id, &SchemaObject::Table(orders_table()))
        .await
        .unwrap();
    store
        .set_description(ObjectClass::Tables, result.description_id, Some("Edited"))
        .await
        .unwrap();

    reconciler
        .reconcile(database_id, &SchemaObject::Table(orders_table()))
        .await
        .unwrap();

    let stored = store.table(database_id, "orders").await.unwrap().unwrap();
    assert_eq!(stored.description.as_deref(), Some("Customer orders"));
}

#[tokio::test]
async fn test_catalog_is_authoritative_without_preservation() {
    let config = SyncConfig::default().with_preserve_documentation(false);
    let (reconciler, database_id) = setup(config).await;
    let store = reconciler.store().clone();

    let mut table = orders_table();
    table.comment = None;
    let result = reconciler
        .reconcile(database_id, &SchemaObject::Table(table.clone()))
        .await
        .unwrap();
    store
        .set_description(ObjectClass::Tables, result.description_id, Some("Edited"))
        .await
        .unwrap();
    store
        .set_column_documentation(result.description_id, "status", Some("State"), None, Some(3))
        .await
        .unwrap();

    reconciler
        .reconcile(database_id, &SchemaObject::Table(table))
        .await
        .unwrap();

    let stored = store.table(database_id, "orders").await.unwrap().unwrap();
    assert_eq!(stored.description, None);
    let columns = store.columns(result.description_id).await.unwrap();
    assert!(columns.iter().all(|c| c.release_id.is_none()));
    assert_eq!(columns[2].description, None);
}

#[tokio::test]
async fn test_failed_object_is_rolled_back() {
    let (reconciler, database_id) = setup(SyncConfig::default()).await;
    let store = reconciler.store().clone();

    let result = reconciler
        .reconcile(database_id, &SchemaObject::Table(orders_table()))
        .await
        .unwrap();

    let mut broken = orders_table();
    broken.comment = Some("Should not be written".to_string());
    broken.columns.push(column("status", 4, "int", None));

    let err = reconciler
        .reconcile(database_id, &SchemaObject::Table(broken))
        .await
        .unwrap_err();
    assert!(!err.is_fatal());
    match err {
        SchemaDocError::Reconcile {
            object_class,
            object_name,
            ..
        } => {
            assert_eq!(object_class, ObjectClass::Tables);
            assert_eq!(object_name, "orders");
        }
        other => panic!("expected reconcile error, got {other:?}"),
    }

    let stored = store.table(database_id, "orders").await.unwrap().unwrap();
    assert_eq!(stored.description.as_deref(), Some("Customer orders"));
    let columns = store.columns(result.description_id).await.unwrap();
    assert_eq!(columns.len(), 3);
    assert_eq!(store.indexes(result.description_id).await.unwrap().len(), 1);
    assert_eq!(store.orphan_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_wide_table_is_inserted_in_batches() {
    let (reconciler, database_id) = setup(SyncConfig::default().with_batch_size(150)).await;
    let store = reconciler.store().clone();

    let mut table = orders_table();
    table.columns = (1..=400)
        .map(|i| column(&format!("c{i:03}"), i, "int", None))
        .collect();
    table.indexes.clear();
    table.relations.clear();

    let result = reconciler
        .reconcile(database_id, &SchemaObject::Table(table))
        .await
        .unwrap();
    assert_eq!(result.children, 400);

    let columns = store.columns(result.description_id).await.unwrap();
    assert_eq!(columns.len(), 400);
    assert_eq!(columns[399].column_name, "c400");
}

#[tokio::test]
async fn test_columns_for_many_tables() {
    let (reconciler, database_id) = setup(SyncConfig::default()).await;
    let store = reconciler.store().clone();

    let mut ids = Vec::new();
    for name in ["orders", "customers", "invoices"] {
        let mut table = orders_table();
        table.name = name.to_string();
        let result = reconciler
            .reconcile(database_id, &SchemaObject::Table(table))
            .await
            .unwrap();
        ids.push(result.description_id);
    }

    let grouped = store.columns_for_tables(&ids, 2).await.unwrap();
    assert_eq!(grouped.len(), 3);
    assert!(grouped.values().all(|columns| columns.len() == 3));
}

#[tokio::test]
async fn test_view_with_columns() {
    let (reconciler, database_id) = setup(SyncConfig::default()).await;
    let store = reconciler.store().clone();

    let view = ViewRecord {
        schema: Some("shop".to_string()),
        name: "open_orders".to_string(),
        comment: None,
        definition: Some("SELECT id, status FROM orders WHERE status <> 'SHIPPED'".to_string()),
        created_at: None,
        updated_at: None,
        columns: vec![
            column("id", 1, "int", None),
            column("status", 2, "varchar(20)", None),
        ],
    };

    let result = reconciler
        .reconcile(database_id, &SchemaObject::View(view.clone()))
        .await
        .unwrap();
    let again = reconciler
        .reconcile(database_id, &SchemaObject::View(view))
        .await
        .unwrap();
    assert_eq!(result.description_id, again.description_id);

    let information = store
        .view_information(result.description_id)
        .await
        .unwrap()
        .unwrap();
    assert!(information.definition.unwrap().contains("FROM orders"));
    assert_eq!(store.view_columns(result.description_id).await.unwrap().len(), 2);

    let views = store.descriptions(ObjectClass::Views, database_id).await.unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].name, "open_orders");
}

#[tokio::test]
async fn test_routines_keep_parameter_descriptions() {
    let (reconciler, database_id) = setup(SyncConfig::default()).await;
    let store = reconciler.store().clone();

    let procedure = RoutineRecord {
        schema: Some("shop".to_string()),
        name: "place_order".to_string(),
        comment: Some("Creates an order".to_string()),
        definition: Some("BEGIN INSERT INTO orders VALUES (); END".to_string()),
        return_type: None,
        language: Some("SQL".to_string()),
        created_at: None,
        updated_at: None,
        parameters: vec![
            ParameterRecord {
                name: "p_customer".to_string(),
                ordinal: 1,
                canonical_type: "int".to_string(),
                mode: ParameterMode::In,
            },
            ParameterRecord {
                name: "p_order".to_string(),
                ordinal: 2,
                canonical_type: "int".to_string(),
                mode: ParameterMode::Out,
            },
        ],
    };

    let result = reconciler
        .reconcile(database_id, &SchemaObject::Procedure(procedure.clone()))
        .await
        .unwrap();
    assert_eq!(result.children, 2);

    // A function of the same name lives in its own family
    let function = RoutineRecord {
        return_type: Some("int".to_string()),
        parameters: Vec::new(),
        ..procedure.clone()
    };
    reconciler
        .reconcile(database_id, &SchemaObject::Function(function))
        .await
        .unwrap();

    let information = store
        .routine_information(ObjectClass::Procedures, result.description_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(information.routine_language.as_deref(), Some("SQL"));

    let parameters = store
        .parameters(ObjectClass::Procedures, result.description_id)
        .await
        .unwrap();
    assert_eq!(parameters.len(), 2);
    assert_eq!(parameters[1].mode, "OUT");

    let functions = store
        .descriptions(ObjectClass::Functions, database_id)
        .await
        .unwrap();
    assert_eq!(functions.len(), 1);
    let function_info = store
        .routine_information(ObjectClass::Functions, functions[0].id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(function_info.return_type.as_deref(), Some("int"));
}

#[tokio::test]
async fn test_trigger_information_is_upserted() {
    let (reconciler, database_id) = setup(SyncConfig::default()).await;
    let store = reconciler.store().clone();

    let mut trigger = TriggerRecord {
        schema: Some("shop".to_string()),
        name: "orders_audit".to_string(),
        table_name: "orders".to_string(),
        timing: TriggerTiming::After,
        events: vec![TriggerEvent::Insert, TriggerEvent::Update],
        definition: Some("INSERT INTO audit VALUES (NEW.id)".to_string()),
        comment: None,
        enabled: true,
        created_at: None,
        updated_at: None,
    };

    let result = reconciler
        .reconcile(database_id, &SchemaObject::Trigger(trigger.clone()))
        .await
        .unwrap();
    assert_eq!(result.children, 0);

    trigger.enabled = false;
    trigger.timing = TriggerTiming::Before;
    reconciler
        .reconcile(database_id, &SchemaObject::Trigger(trigger))
        .await
        .unwrap();

    let information = store
        .trigger_information(result.description_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(information.table_name, "orders");
    assert_eq!(information.timing, "BEFORE");
    assert_eq!(information.events, "INSERT,UPDATE");
    assert!(!information.enabled);
    assert_eq!(store.orphan_count().await.unwrap(), 0);
}
