//! Decoding of per-object child collections packed as JSON text.
//!
//! Every dialect returns one row per object from its bulk catalog query and
//! aggregates that object's columns, indexes, foreign keys or parameters into
//! a JSON array column. The element shapes are identical across dialects so
//! a single set of serde types decodes all of them.

use crate::models::{
    ColumnRecord, IndexRecord, KeyKind, ParameterMode, ParameterRecord, ReferentialAction,
    RelationRecord, TableRecord, TriggerEvent,
};
use crate::type_format::format_type;
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;

/// Dialect spelling of catalog values that the shared decoders normalize.
pub(crate) trait CatalogSpelling {
    /// Canonical base name of a catalog type name.
    fn type_name(&self, raw: &str) -> String {
        raw.to_string()
    }

    /// Referential action from its catalog spelling.
    fn referential_action(&self, raw: &str) -> Option<ReferentialAction> {
        ReferentialAction::parse(raw)
    }
}

/// Catalogs that already use SQL spellings (MySQL, SQL Server).
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Standard;

impl CatalogSpelling for Standard {}

/// Accepts JSON booleans as well as the 0/1 integers MySQL emits for
/// `TINYINT(1)` and `BIT` expressions.
fn flexible_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Text(String),
    }

    match Option::<Flag>::deserialize(deserializer)? {
        None => Ok(false),
        Some(Flag::Bool(value)) => Ok(value),
        Some(Flag::Int(value)) => Ok(value != 0),
        Some(Flag::Text(value)) => match value.to_ascii_uppercase().as_str() {
            "YES" | "TRUE" | "1" => Ok(true),
            "NO" | "FALSE" | "0" | "" => Ok(false),
            other => Err(de::Error::custom(format!("invalid boolean flag '{other}'"))),
        },
    }
}

/// Empty and whitespace-only comments carry no documentation.
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

/// Decodes a packed JSON array; NULL or blank text is an empty collection.
pub(crate) fn decode_packed<T: DeserializeOwned>(json: Option<&str>) -> sqlx::Result<Vec<T>> {
    match json.map(str::trim) {
        None | Some("") => Ok(Vec::new()),
        Some(text) => serde_json::from_str(text).map_err(|e| sqlx::Error::Decode(Box::new(e))),
    }
}

/// Splits a comma separated list, dropping empty entries.
pub(crate) fn split_list(list: Option<&str>) -> Vec<String> {
    list.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses a comma separated trigger event list, ignoring unknown events.
pub(crate) fn parse_event_list(list: Option<&str>) -> Vec<TriggerEvent> {
    let mut events: Vec<TriggerEvent> = split_list(list)
        .iter()
        .filter_map(|event| TriggerEvent::parse(event))
        .collect();
    events.sort_by_key(|event| *event as u8);
    events.dedup();
    events
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub(crate) struct PackedColumn {
    pub(crate) name: String,
    pub(crate) ordinal: i64,
    pub(crate) type_name: Option<String>,
    pub(crate) max_length: Option<i64>,
    pub(crate) precision: Option<i64>,
    pub(crate) scale: Option<i64>,
    #[serde(deserialize_with = "flexible_bool")]
    pub(crate) nullable: bool,
    pub(crate) default_value: Option<String>,
    pub(crate) comment: Option<String>,
}

impl Default for PackedColumn {
    fn default() -> Self {
        Self {
            name: String::new(),
            ordinal: 0,
            type_name: None,
            max_length: None,
            precision: None,
            scale: None,
            nullable: true,
            default_value: None,
            comment: None,
        }
    }
}

impl PackedColumn {
    pub(crate) fn into_record(self, spelling: &impl CatalogSpelling) -> ColumnRecord {
        let type_name = self.type_name.as_deref().map(|raw| spelling.type_name(raw));
        ColumnRecord {
            canonical_type: format_type(
                type_name.as_deref(),
                self.max_length,
                self.precision,
                self.scale,
            ),
            name: self.name,
            ordinal: u32::try_from(self.ordinal).unwrap_or_default(),
            nullable: self.nullable,
            key_kind: KeyKind::None,
            default_value: self.default_value,
            comment: non_empty(self.comment),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct PackedIndex {
    pub(crate) name: String,
    pub(crate) index_type: Option<String>,
    pub(crate) column_list: Option<String>,
    #[serde(deserialize_with = "flexible_bool")]
    pub(crate) is_primary: bool,
    #[serde(deserialize_with = "flexible_bool")]
    pub(crate) is_unique: bool,
}

impl PackedIndex {
    pub(crate) fn into_record(self) -> IndexRecord {
        IndexRecord {
            columns: split_list(self.column_list.as_deref()),
            name: self.name,
            index_type: self.index_type.map(|kind| kind.to_ascii_uppercase()),
            is_primary: self.is_primary,
            is_unique: self.is_unique || self.is_primary,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct PackedRelation {
    pub(crate) constraint_name: String,
    pub(crate) position: i64,
    pub(crate) column_name: String,
    pub(crate) referenced_table: String,
    pub(crate) referenced_column: String,
    pub(crate) on_delete: Option<String>,
    pub(crate) on_update: Option<String>,
}

impl PackedRelation {
    pub(crate) fn into_record(self, spelling: &impl CatalogSpelling) -> RelationRecord {
        RelationRecord {
            on_delete: self
                .on_delete
                .as_deref()
                .and_then(|raw| spelling.referential_action(raw)),
            on_update: self
                .on_update
                .as_deref()
                .and_then(|raw| spelling.referential_action(raw)),
            constraint_name: self.constraint_name,
            column_name: self.column_name,
            referenced_table: self.referenced_table,
            referenced_column: self.referenced_column,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct PackedParameter {
    pub(crate) name: Option<String>,
    pub(crate) ordinal: i64,
    pub(crate) type_name: Option<String>,
    pub(crate) max_length: Option<i64>,
    pub(crate) precision: Option<i64>,
    pub(crate) scale: Option<i64>,
    pub(crate) mode: Option<String>,
}

impl PackedParameter {
    /// Unnamed parameters are named positionally, e.g. `$2`.
    pub(crate) fn into_record(self, spelling: &impl CatalogSpelling) -> ParameterRecord {
        let ordinal = u32::try_from(self.ordinal).unwrap_or_default();
        let type_name = self.type_name.as_deref().map(|raw| spelling.type_name(raw));
        ParameterRecord {
            name: non_empty(self.name).unwrap_or_else(|| format!("${ordinal}")),
            ordinal,
            canonical_type: format_type(
                type_name.as_deref(),
                self.max_length,
                self.precision,
                self.scale,
            ),
            mode: self
                .mode
                .as_deref()
                .map(ParameterMode::parse)
                .unwrap_or_default(),
        }
    }
}

/// Packed JSON payloads of one table row.
#[derive(Debug, Default)]
pub(crate) struct PackedTable<'a> {
    pub(crate) schema: Option<String>,
    pub(crate) name: String,
    pub(crate) comment: Option<String>,
    pub(crate) columns: Option<&'a str>,
    pub(crate) indexes: Option<&'a str>,
    pub(crate) relations: Option<&'a str>,
}

impl PackedTable<'_> {
    /// Decodes children, restores their catalog order and derives key kinds.
    pub(crate) fn assemble(self, spelling: &impl CatalogSpelling) -> sqlx::Result<TableRecord> {
        let mut columns: Vec<PackedColumn> = decode_packed(self.columns)?;
        columns.sort_by_key(|column| column.ordinal);

        let mut indexes: Vec<PackedIndex> = decode_packed(self.indexes)?;
        indexes.sort_by(|a, b| a.name.cmp(&b.name));

        let mut relations: Vec<PackedRelation> = decode_packed(self.relations)?;
        relations.sort_by(|a, b| {
            a.constraint_name
                .cmp(&b.constraint_name)
                .then(a.position.cmp(&b.position))
        });

        let mut table = TableRecord {
            schema: self.schema,
            name: self.name,
            comment: non_empty(self.comment),
            columns: columns
                .into_iter()
                .map(|column| column.into_record(spelling))
                .collect(),
            indexes: indexes.into_iter().map(PackedIndex::into_record).collect(),
            relations: relations
                .into_iter()
                .map(|relation| relation.into_record(spelling))
                .collect(),
        };
        table.derive_key_kinds();
        Ok(table)
    }
}

/// Decodes a packed column array in ordinal order.
pub(crate) fn decode_columns(
    json: Option<&str>,
    spelling: &impl CatalogSpelling,
) -> sqlx::Result<Vec<ColumnRecord>> {
    let mut columns: Vec<PackedColumn> = decode_packed(json)?;
    columns.sort_by_key(|column| column.ordinal);
    Ok(columns
        .into_iter()
        .map(|column| column.into_record(spelling))
        .collect())
}

/// Decodes a packed parameter array in ordinal order.
pub(crate) fn decode_parameters(
    json: Option<&str>,
    spelling: &impl CatalogSpelling,
) -> sqlx::Result<Vec<ParameterRecord>> {
    let mut parameters: Vec<PackedParameter> = decode_packed(json)?;
    parameters.sort_by_key(|parameter| parameter.ordinal);
    Ok(parameters
        .into_iter()
        .map(|parameter| parameter.into_record(spelling))
        .collect())
}
