//! PostgreSQL catalog value mapping.
//!
//! `pg_catalog` spells types by their internal names (`int4`, `bpchar`,
//! `_text`) and encodes foreign key actions and trigger kinds as single
//! characters and bitmasks. These helpers translate them to the canonical
//! spellings the repository stores.

use crate::adapters::packed::CatalogSpelling;
use crate::models::{ReferentialAction, TriggerEvent, TriggerTiming};

// pg_trigger.tgtype bits
const TRIGGER_TYPE_BEFORE: i32 = 1 << 1;
const TRIGGER_TYPE_INSERT: i32 = 1 << 2;
const TRIGGER_TYPE_DELETE: i32 = 1 << 3;
const TRIGGER_TYPE_UPDATE: i32 = 1 << 4;
const TRIGGER_TYPE_TRUNCATE: i32 = 1 << 5;
const TRIGGER_TYPE_INSTEAD: i32 = 1 << 6;

/// Maps a `pg_type.typname` to its SQL spelling.
///
/// Array types (`_int4`) become `integer[]`; names without an alias pass
/// through unchanged.
pub fn normalize_pg_type(typname: &str) -> String {
    if let Some(element) = typname.strip_prefix('_') {
        return format!("{}[]", normalize_pg_type(element));
    }

    match typname {
        "int2" => "smallint",
        "int4" => "integer",
        "int8" => "bigint",
        "float4" => "real",
        "float8" => "double precision",
        "bool" => "boolean",
        "bpchar" => "char",
        "timestamptz" => "timestamp with time zone",
        "timetz" => "time with time zone",
        other => other,
    }
    .to_string()
}

/// Maps `pg_constraint.confdeltype`/`confupdtype` codes.
pub fn map_referential_action(code: &str) -> Option<ReferentialAction> {
    match code {
        "a" => Some(ReferentialAction::NoAction),
        "r" => Some(ReferentialAction::Restrict),
        "c" => Some(ReferentialAction::Cascade),
        "n" => Some(ReferentialAction::SetNull),
        "d" => Some(ReferentialAction::SetDefault),
        _ => None,
    }
}

/// Decodes the `pg_trigger.tgtype` bitmask into timing and every event the
/// trigger fires on.
pub fn parse_trigger_type(tgtype: i32) -> (TriggerTiming, Vec<TriggerEvent>) {
    let timing = if tgtype & TRIGGER_TYPE_INSTEAD != 0 {
        TriggerTiming::InsteadOf
    } else if tgtype & TRIGGER_TYPE_BEFORE != 0 {
        TriggerTiming::Before
    } else {
        TriggerTiming::After
    };

    let events = [
        (TRIGGER_TYPE_INSERT, TriggerEvent::Insert),
        (TRIGGER_TYPE_UPDATE, TriggerEvent::Update),
        (TRIGGER_TYPE_DELETE, TriggerEvent::Delete),
        (TRIGGER_TYPE_TRUNCATE, TriggerEvent::Truncate),
    ]
    .into_iter()
    .filter(|(bit, _)| tgtype & bit != 0)
    .map(|(_, event)| event)
    .collect();

    (timing, events)
}

/// Major version from `current_setting('server_version_num')`.
///
/// `"160002"` yields 16 and `"90624"` yields 9. Anything that is not a
/// plausible version number yields `None`.
pub fn parse_server_version_num(raw: &str) -> Option<u32> {
    raw.trim()
        .parse::<u32>()
        .ok()
        .filter(|number| *number >= 10_000)
        .map(|number| number / 10_000)
}

/// `pg_catalog` spelling hooks for the shared payload decoders.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct PgSpelling;

impl CatalogSpelling for PgSpelling {
    fn type_name(&self, raw: &str) -> String {
        normalize_pg_type(raw)
    }

    fn referential_action(&self, raw: &str) -> Option<ReferentialAction> {
        map_referential_action(raw)
    }
}
