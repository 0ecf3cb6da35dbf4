//! Dialect-independent structural model.
//!
//! Dialect adapters produce these intermediate records; the reconciler
//! persists them. Every record carries its children already populated so
//! one catalog query per object class is enough to describe a database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Supported source dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Mssql,
    Mysql,
    Pgsql,
}

impl Dialect {
    /// Stable lowercase identifier used in configuration and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Mssql => "mssql",
            Dialect::Mysql => "mysql",
            Dialect::Pgsql => "pgsql",
        }
    }

    /// Maps a connection URL scheme to its dialect.
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "mssql" | "sqlserver" => Some(Dialect::Mssql),
            "mysql" | "mariadb" => Some(Dialect::Mysql),
            "postgres" | "postgresql" | "pgsql" => Some(Dialect::Pgsql),
            _ => None,
        }
    }

    /// Default TCP port of the dialect's server.
    pub fn default_port(&self) -> u16 {
        match self {
            Dialect::Mssql => 1433,
            Dialect::Mysql => 3306,
            Dialect::Pgsql => 5432,
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Dialect {
    type Err = crate::error::SchemaDocError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dialect::from_scheme(s).ok_or_else(|| {
            crate::error::SchemaDocError::configuration(format!(
                "Unknown dialect '{}': expected one of mssql, mysql, pgsql",
                s
            ))
        })
    }
}

/// Object classes, declared in synchronization order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectClass {
    Tables,
    Views,
    Functions,
    Procedures,
    Triggers,
}

impl ObjectClass {
    /// Fixed synchronization order.
    pub const ALL: [ObjectClass; 5] = [
        ObjectClass::Tables,
        ObjectClass::Views,
        ObjectClass::Functions,
        ObjectClass::Procedures,
        ObjectClass::Triggers,
    ];

    /// Lowercase plural name
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectClass::Tables => "tables",
            ObjectClass::Views => "views",
            ObjectClass::Functions => "functions",
            ObjectClass::Procedures => "procedures",
            ObjectClass::Triggers => "triggers",
        }
    }
}

impl std::fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key participation of a column
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyKind {
    #[default]
    None,
    Primary,
    Foreign,
    Unique,
}

impl KeyKind {
    /// Repository spelling: `none`, `PK`, `FK`, `UK`.
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyKind::None => "none",
            KeyKind::Primary => "PK",
            KeyKind::Foreign => "FK",
            KeyKind::Unique => "UK",
        }
    }

    /// Parses the repository spelling; anything unknown is `None`.
    pub fn parse(value: &str) -> Self {
        match value {
            "PK" => KeyKind::Primary,
            "FK" => KeyKind::Foreign,
            "UK" => KeyKind::Unique,
            _ => KeyKind::None,
        }
    }
}

/// Referential actions for foreign keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferentialAction {
    Cascade,
    SetNull,
    SetDefault,
    Restrict,
    NoAction,
}

impl ReferentialAction {
    /// Parses the catalog spelling used by MySQL (`NO ACTION`) and
    /// SQL Server (`NO_ACTION`).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().replace('_', " ").as_str() {
            "CASCADE" => Some(ReferentialAction::Cascade),
            "SET NULL" => Some(ReferentialAction::SetNull),
            "SET DEFAULT" => Some(ReferentialAction::SetDefault),
            "RESTRICT" => Some(ReferentialAction::Restrict),
            "NO ACTION" => Some(ReferentialAction::NoAction),
            _ => None,
        }
    }

    /// SQL spelling stored in the repository
    pub fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::NoAction => "NO ACTION",
        }
    }
}

/// Routine parameter direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterMode {
    #[default]
    In,
    Out,
    InOut,
    Variadic,
    Table,
}

impl ParameterMode {
    /// Parses MySQL words (`IN`, `OUT`, `INOUT`) and PostgreSQL
    /// `proargmodes` codes (`i`, `o`, `b`, `v`, `t`).
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "o" | "OUT" | "out" => ParameterMode::Out,
            "b" | "INOUT" | "inout" => ParameterMode::InOut,
            "v" | "VARIADIC" | "variadic" => ParameterMode::Variadic,
            "t" | "TABLE" | "table" => ParameterMode::Table,
            _ => ParameterMode::In,
        }
    }

    /// SQL spelling stored in the repository
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterMode::In => "IN",
            ParameterMode::Out => "OUT",
            ParameterMode::InOut => "INOUT",
            ParameterMode::Variadic => "VARIADIC",
            ParameterMode::Table => "TABLE",
        }
    }
}

/// Trigger timing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerTiming {
    Before,
    After,
    InsteadOf,
}

impl TriggerTiming {
    /// SQL spelling stored in the repository
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerTiming::Before => "BEFORE",
            TriggerTiming::After => "AFTER",
            TriggerTiming::InsteadOf => "INSTEAD OF",
        }
    }

    /// Parses catalog timing words in any case; `INSTEAD_OF` is accepted
    /// for `INSTEAD OF`. Anything unrecognized, including the `FOR` synonym,
    /// is `After`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_uppercase().replace('_', " ").as_str() {
            "BEFORE" => TriggerTiming::Before,
            "INSTEAD OF" => TriggerTiming::InsteadOf,
            _ => TriggerTiming::After,
        }
    }
}

/// Trigger events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerEvent {
    Insert,
    Update,
    Delete,
    Truncate,
}

impl TriggerEvent {
    /// SQL spelling stored in the repository
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerEvent::Insert => "INSERT",
            TriggerEvent::Update => "UPDATE",
            TriggerEvent::Delete => "DELETE",
            TriggerEvent::Truncate => "TRUNCATE",
        }
    }

    /// Parses one event word in any case. Returns `None` for anything else,
    /// so callers can drop events they do not track.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "INSERT" => Some(TriggerEvent::Insert),
            "UPDATE" => Some(TriggerEvent::Update),
            "DELETE" => Some(TriggerEvent::Delete),
            "TRUNCATE" => Some(TriggerEvent::Truncate),
            _ => None,
        }
    }
}

/// Column of a table or view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRecord {
    pub name: String,
    pub ordinal: u32,
    pub canonical_type: String,
    pub nullable: bool,
    pub key_kind: KeyKind,
    pub default_value: Option<String>,
    pub comment: Option<String>,
}

/// Table index; `columns` keeps key order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub name: String,
    pub index_type: Option<String>,
    pub columns: Vec<String>,
    pub is_primary: bool,
    pub is_unique: bool,
}

impl IndexRecord {
    /// Comma separated key columns as stored in the repository.
    pub fn column_list(&self) -> String {
        self.columns.join(",")
    }
}

/// One column pair of a foreign key constraint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationRecord {
    pub constraint_name: String,
    pub column_name: String,
    pub referenced_table: String,
    pub referenced_column: String,
    pub on_delete: Option<ReferentialAction>,
    pub on_update: Option<ReferentialAction>,
}

/// Base table with columns, indexes and foreign keys
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRecord {
    pub schema: Option<String>,
    pub name: String,
    pub comment: Option<String>,
    pub columns: Vec<ColumnRecord>,
    pub indexes: Vec<IndexRecord>,
    pub relations: Vec<RelationRecord>,
}

impl TableRecord {
    /// Assigns each column its key kind from the table's indexes and
    /// foreign keys. Primary beats foreign beats unique.
    pub fn derive_key_kinds(&mut self) {
        let primary: HashSet<&str> = self
            .indexes
            .iter()
            .filter(|index| index.is_primary)
            .flat_map(|index| index.columns.iter().map(String::as_str))
            .collect();
        let foreign: HashSet<&str> = self
            .relations
            .iter()
            .map(|relation| relation.column_name.as_str())
            .collect();
        let unique: HashSet<&str> = self
            .indexes
            .iter()
            .filter(|index| index.is_unique && !index.is_primary)
            .flat_map(|index| index.columns.iter().map(String::as_str))
            .collect();

        for column in &mut self.columns {
            let name = column.name.as_str();
            column.key_kind = if primary.contains(name) {
                KeyKind::Primary
            } else if foreign.contains(name) {
                KeyKind::Foreign
            } else if unique.contains(name) {
                KeyKind::Unique
            } else {
                KeyKind::None
            };
        }
    }
}

/// View with definition and output columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewRecord {
    pub schema: Option<String>,
    pub name: String,
    pub comment: Option<String>,
    pub definition: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub columns: Vec<ColumnRecord>,
}

/// Routine parameter; `ordinal` starts at 1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRecord {
    pub name: String,
    pub ordinal: u32,
    pub canonical_type: String,
    pub mode: ParameterMode,
}

/// Function or stored procedure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutineRecord {
    pub schema: Option<String>,
    pub name: String,
    pub comment: Option<String>,
    pub definition: Option<String>,
    pub return_type: Option<String>,
    pub language: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub parameters: Vec<ParameterRecord>,
}

/// Trigger attached to a table or view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRecord {
    pub schema: Option<String>,
    pub name: String,
    pub table_name: String,
    pub timing: TriggerTiming,
    pub events: Vec<TriggerEvent>,
    pub definition: Option<String>,
    pub comment: Option<String>,
    pub enabled: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TriggerRecord {
    /// Comma separated event list, e.g. `INSERT,UPDATE`.
    pub fn event_list(&self) -> String {
        self.events
            .iter()
            .map(TriggerEvent::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Any intermediate record, tagged with its object class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SchemaObject {
    Table(TableRecord),
    View(ViewRecord),
    Function(RoutineRecord),
    Procedure(RoutineRecord),
    Trigger(TriggerRecord),
}

impl SchemaObject {
    /// Natural key within a database
    pub fn name(&self) -> &str {
        match self {
            SchemaObject::Table(table) => &table.name,
            SchemaObject::View(view) => &view.name,
            SchemaObject::Function(routine) | SchemaObject::Procedure(routine) => &routine.name,
            SchemaObject::Trigger(trigger) => &trigger.name,
        }
    }

    pub fn object_class(&self) -> ObjectClass {
        match self {
            SchemaObject::Table(_) => ObjectClass::Tables,
            SchemaObject::View(_) => ObjectClass::Views,
            SchemaObject::Function(_) => ObjectClass::Functions,
            SchemaObject::Procedure(_) => ObjectClass::Procedures,
            SchemaObject::Trigger(_) => ObjectClass::Triggers,
        }
    }

    /// Number of dependent child rows this record produces.
    pub fn child_count(&self) -> usize {
        match self {
            SchemaObject::Table(table) => {
                table.columns.len() + table.indexes.len() + table.relations.len()
            }
            SchemaObject::View(view) => view.columns.len(),
            SchemaObject::Function(routine) | SchemaObject::Procedure(routine) => {
                routine.parameters.len()
            }
            SchemaObject::Trigger(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str) -> ColumnRecord {
        ColumnRecord {
            name: name.to_string(),
            ordinal: 1,
            canonical_type: "int".to_string(),
            nullable: false,
            key_kind: KeyKind::None,
            default_value: None,
            comment: None,
        }
    }

    #[test]
    fn test_dialect_parsing() {
        assert_eq!("mysql".parse::<Dialect>().unwrap(), Dialect::Mysql);
        assert_eq!("postgresql".parse::<Dialect>().unwrap(), Dialect::Pgsql);
        assert_eq!("sqlserver".parse::<Dialect>().unwrap(), Dialect::Mssql);
        assert!("oracle".parse::<Dialect>().is_err());
        assert_eq!(Dialect::Pgsql.to_string(), "pgsql");
        assert_eq!(Dialect::Mssql.default_port(), 1433);
    }

    #[test]
    fn test_object_class_order() {
        let mut shuffled = vec![
            ObjectClass::Triggers,
            ObjectClass::Tables,
            ObjectClass::Procedures,
            ObjectClass::Views,
            ObjectClass::Functions,
        ];
        shuffled.sort();
        assert_eq!(shuffled, ObjectClass::ALL.to_vec());
    }

    #[test]
    fn test_derive_key_kinds() {
        let mut table = TableRecord {
            schema: None,
            name: "orders".to_string(),
            comment: None,
            columns: vec![column("id"), column("customer_id"), column("code"), column("total")],
            indexes: vec![
                IndexRecord {
                    name: "PRIMARY".to_string(),
                    index_type: Some("BTREE".to_string()),
                    columns: vec!["id".to_string()],
                    is_primary: true,
                    is_unique: true,
                },
                IndexRecord {
                    name: "uq_code".to_string(),
                    index_type: None,
                    columns: vec!["code".to_string()],
                    is_primary: false,
                    is_unique: true,
                },
            ],
            relations: vec![RelationRecord {
                constraint_name: "fk_customer".to_string(),
                column_name: "customer_id".to_string(),
                referenced_table: "customers".to_string(),
                referenced_column: "id".to_string(),
                on_delete: Some(ReferentialAction::Cascade),
                on_update: None,
            }],
        };

        table.derive_key_kinds();

        let kinds: Vec<KeyKind> = table.columns.iter().map(|c| c.key_kind).collect();
        assert_eq!(
            kinds,
            vec![KeyKind::Primary, KeyKind::Foreign, KeyKind::Unique, KeyKind::None]
        );
    }

    #[test]
    fn test_referential_action_spellings() {
        assert_eq!(
            ReferentialAction::parse("NO_ACTION"),
            Some(ReferentialAction::NoAction)
        );
        assert_eq!(
            ReferentialAction::parse("set null"),
            Some(ReferentialAction::SetNull)
        );
        assert_eq!(ReferentialAction::parse("bogus"), None);
        assert_eq!(ReferentialAction::SetDefault.as_sql(), "SET DEFAULT");
    }

    #[test]
    fn test_parameter_mode_parsing() {
        assert_eq!(ParameterMode::parse("i"), ParameterMode::In);
        assert_eq!(ParameterMode::parse("b"), ParameterMode::InOut);
        assert_eq!(ParameterMode::parse("OUT"), ParameterMode::Out);
        assert_eq!(ParameterMode::parse(""), ParameterMode::In);
    }

    #[test]
    fn test_trigger_word_parsing() {
        assert_eq!(TriggerTiming::parse(" before "), TriggerTiming::Before);
        assert_eq!(TriggerTiming::parse("instead of"), TriggerTiming::InsteadOf);
        assert_eq!(TriggerTiming::parse("FOR"), TriggerTiming::After);
        assert_eq!(TriggerTiming::InsteadOf.as_str(), "INSTEAD OF");

        assert_eq!(TriggerEvent::parse("truncate"), Some(TriggerEvent::Truncate));
        assert_eq!(TriggerEvent::parse("SELECT"), None);
        assert_eq!(TriggerEvent::Delete.as_str(), "DELETE");
    }

    #[test]
    fn test_trigger_event_list() {
        let trigger = TriggerRecord {
            schema: None,
            name: "trg_audit".to_string(),
            table_name: "orders".to_string(),
            timing: TriggerTiming::parse("INSTEAD_OF"),
            events: vec![TriggerEvent::Insert, TriggerEvent::Update],
            definition: None,
            comment: None,
            enabled: true,
            created_at: None,
            updated_at: None,
        };
        assert_eq!(trigger.timing, TriggerTiming::InsteadOf);
        assert_eq!(trigger.event_list(), "INSERT,UPDATE");
    }
}
