use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde_json::Value;

use super::session::Session;
use crate::record::{self, Record};
use crate::{BackendKind, CoreError, DatabaseAdapter, TableClient};

/// In-process tables keyed by name; rows keep insertion order.
#[derive(Default)]
pub struct MemoryTables {
    inner: Mutex<BTreeMap<String, Vec<Record>>>,
}

impl MemoryTables {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, Vec<Record>>>, CoreError> {
        self.inner
            .lock()
            .map_err(|_| CoreError::Backend("mutex poisoned".into()))
    }

    /// Append rows verbatim, without completing ids or timestamps.
    pub fn seed(&self, table: &str, rows: Vec<Record>) -> Result<(), CoreError> {
        let mut map = self.lock()?;
        map.entry(table.to_string()).or_default().extend(rows);
        Ok(())
    }
}

impl TableClient for MemoryTables {
    fn select_all(&self, table: &str) -> Result<Vec<Record>, CoreError> {
        let map = self.lock()?;
        Ok(map.get(table).cloned().unwrap_or_default())
    }

    fn insert_one(&self, table: &str, data: Record) -> Result<Record, CoreError> {
        let mut map = self.lock()?;
        let row = record::complete_new(data, Utc::now());
        let rows = map.entry(table.to_string()).or_default();
        let id = record::id_of(&row).unwrap_or_default();
        if rows.iter().any(|r| record::id_of(r) == Some(id)) {
            return Err(CoreError::AlreadyExists(format!("{} row {}", table, id)));
        }
        rows.push(row.clone());
        Ok(row)
    }

    fn update_by_id(&self, table: &str, id: &str, data: Record) -> Result<Record, CoreError> {
        let mut map = self.lock()?;
        let row = map
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|r| record::id_of(r) == Some(id)))
            .ok_or_else(|| CoreError::NotFound(format!("{} row {}", table, id)))?;
        record::apply_patch(row, data, Utc::now());
        Ok(row.clone())
    }

    fn delete_by_id(&self, table: &str, id: &str) -> Result<(), CoreError> {
        let mut map = self.lock()?;
        let rows = map
            .get_mut(table)
            .ok_or_else(|| CoreError::NotFound(format!("{} row {}", table, id)))?;
        let before = rows.len();
        rows.retain(|r| record::id_of(r) != Some(id));
        if rows.len() == before {
            return Err(CoreError::NotFound(format!("{} row {}", table, id)));
        }
        Ok(())
    }
}

/// Adapter over [`MemoryTables`]. Data survives disconnect/connect cycles of
/// the same adapter but is lost with it.
pub struct MemoryAdapter {
    tables: Arc<MemoryTables>,
    session: Session<MemoryTables>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::with_tables(Arc::new(MemoryTables::new()))
    }

    /// Build an adapter over existing tables, e.g. pre-seeded fixtures.
    pub fn with_tables(tables: Arc<MemoryTables>) -> Self {
        Self {
            tables,
            session: Session::new(BackendKind::Memory),
        }
    }

    #[cfg(test)]
    pub(crate) fn connected() -> Self {
        let adapter = Self::new();
        adapter.connect().unwrap();
        adapter
    }
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseAdapter for MemoryAdapter {
    fn connect(&self) -> Result<(), CoreError> {
        self.session.attach(Arc::clone(&self.tables))
    }

    fn disconnect(&self) -> Result<(), CoreError> {
        self.session.detach()
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Record>, CoreError> {
        self.session.query(sql, params)
    }

    fn insert(&self, table: &str, data: Record) -> Result<Record, CoreError> {
        self.session.insert(table, data)
    }

    fn update(&self, table: &str, id: &str, data: Record) -> Result<Record, CoreError> {
        self.session.update(table, id, data)
    }

    fn delete(&self, table: &str, id: &str) -> Result<(), CoreError> {
        self.session.delete(table, id)
    }

    fn backend_kind(&self) -> BackendKind {
        BackendKind::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Record {
        match v {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn query_returns_seeded_rows_exactly() {
        let tables = Arc::new(MemoryTables::new());
        tables
            .seed("users", vec![obj(json!({"id": "1", "name": "foo"}))])
            .unwrap();
        let adapter = MemoryAdapter::with_tables(tables);
        adapter.connect().unwrap();

        let rows = adapter.query("SELECT * FROM users", &[]).unwrap();
        assert_eq!(rows, vec![obj(json!({"id": "1", "name": "foo"}))]);
    }

    #[test]
    fn unsupported_query_is_rejected() {
        let adapter = MemoryAdapter::connected();
        let err = adapter.query("DROP TABLE users", &[]).unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedQuery(q) if q == "DROP TABLE users"));
    }

    #[test]
    fn operations_before_connect_fail() {
        let adapter = MemoryAdapter::new();
        assert!(matches!(
            adapter.query("SELECT * FROM users", &[]),
            Err(CoreError::NotConnected(BackendKind::Memory))
        ));
        assert!(matches!(
            adapter.insert("users", Record::new()),
            Err(CoreError::NotConnected(_))
        ));
        assert!(matches!(
            adapter.delete("users", "1"),
            Err(CoreError::NotConnected(_))
        ));
    }

    #[test]
    fn disconnect_is_safe_and_data_survives_reconnect() {
        let adapter = MemoryAdapter::new();
        adapter.disconnect().unwrap();
        adapter.connect().unwrap();
        adapter.connect().unwrap();
        let row = adapter.insert("users", obj(json!({"name": "bar"}))).unwrap();

        adapter.disconnect().unwrap();
        assert!(matches!(
            adapter.query("SELECT * FROM users", &[]),
            Err(CoreError::NotConnected(_))
        ));

        adapter.connect().unwrap();
        let rows = adapter.query("SELECT * FROM users", &[]).unwrap();
        assert_eq!(rows, vec![row]);
    }

    #[test]
    fn insert_update_delete_roundtrip() {
        let adapter = MemoryAdapter::connected();
        let created = adapter.insert("users", obj(json!({"name": "bar"}))).unwrap();
        let id = record::id_of(&created).unwrap().to_string();
        assert!(created.contains_key(record::CREATED_AT));

        let updated = adapter
            .update("users", &id, obj(json!({"name": "baz"})))
            .unwrap();
        assert_eq!(updated.get("name"), Some(&json!("baz")));
        assert_eq!(record::id_of(&updated), Some(id.as_str()));

        adapter.delete("users", &id).unwrap();
        assert!(adapter.query("SELECT * FROM users", &[]).unwrap().is_empty());
    }

    #[test]
    fn missing_rows_surface_not_found() {
        let adapter = MemoryAdapter::connected();
        assert!(matches!(
            adapter.update("users", "nope", Record::new()),
            Err(CoreError::NotFound(_))
        ));
        assert!(matches!(
            adapter.delete("users", "nope"),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn duplicate_supplied_id_is_rejected() {
        let adapter = MemoryAdapter::connected();
        adapter.insert("users", obj(json!({"id": "u1"}))).unwrap();
        let err = adapter.insert("users", obj(json!({"id": "u1"}))).unwrap_err();
        assert!(matches!(err, CoreError::AlreadyExists(_)));
    }

    #[test]
    fn reports_backend_kind() {
        assert_eq!(MemoryAdapter::new().backend_kind(), BackendKind::Memory);
    }
}
