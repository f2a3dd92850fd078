//! Untyped rows exchanged with adapters and the field conventions every
//! persisted entity follows (`id`, `createdAt`, `updatedAt`).

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

/// A single row as a JSON object.
pub type Record = Map<String, Value>;

pub const ID: &str = "id";
pub const CREATED_AT: &str = "createdAt";
pub const UPDATED_AT: &str = "updatedAt";

/// Render a timestamp the way persisted rows carry it.
pub fn timestamp(at: DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// The row's identifier, if it has a string `id`.
pub fn id_of(row: &Record) -> Option<&str> {
    row.get(ID).and_then(Value::as_str)
}

/// Complete a partial row on insert: assign an id unless one was supplied and
/// stamp both timestamps.
pub fn complete_new(mut partial: Record, now: DateTime<Utc>) -> Record {
    if id_of(&partial).is_none() {
        partial.insert(ID.into(), Value::String(uuid::Uuid::new_v4().to_string()));
    }
    let stamp = timestamp(now);
    partial.insert(CREATED_AT.into(), stamp.clone());
    partial.insert(UPDATED_AT.into(), stamp);
    partial
}

/// Shallow-merge `patch` into `existing`. `id` and `createdAt` are kept.
pub fn apply_patch(existing: &mut Record, patch: Record, now: DateTime<Utc>) {
    for (field, value) in patch {
        if field == ID || field == CREATED_AT {
            continue;
        }
        existing.insert(field, value);
    }
    existing.insert(UPDATED_AT.into(), timestamp(now));
}

/// True when every filter field is present on `row` with an equal value.
pub fn matches(row: &Record, filters: &Record) -> bool {
    filters
        .iter()
        .all(|(field, expected)| row.get(field) == Some(expected))
}
