//! Typed façade over one adapter and one table.
//!
//! The adapter contract has no filtered fetch, so every read here is a full
//! table scan followed by in-memory matching. Finders return `Ok(None)` on
//! absence; every other failure is passed through.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::query::scan_all;
use crate::record::{self, Record};
use crate::{CoreError, DatabaseAdapter};

/// A persisted entity stored in its own table.
pub trait Entity: DeserializeOwned {
    const TABLE: &'static str;
}

pub struct Repository<T> {
    adapter: Arc<dyn DatabaseAdapter>,
    table: String,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Repository<T> {
    pub fn new(adapter: Arc<dyn DatabaseAdapter>) -> Self {
        Self::with_table(adapter, T::TABLE)
    }

    pub fn with_table<S: Into<String>>(adapter: Arc<dyn DatabaseAdapter>, table: S) -> Self {
        Self {
            adapter,
            table: table.into(),
            _entity: PhantomData,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn find_by_id(&self, id: &str) -> Result<Option<T>, CoreError> {
        self.find_by_field(record::ID, &Value::String(id.to_string()))
    }

    /// First row whose `field` equals `value`.
    pub fn find_by_field(&self, field: &str, value: &Value) -> Result<Option<T>, CoreError> {
        self.scan()?
            .into_iter()
            .find(|row| row.get(field) == Some(value))
            .map(|row| self.decode(row))
            .transpose()
    }

    /// All rows matching every filter by strict equality; `None` keeps all.
    pub fn find_all(&self, filters: Option<&Record>) -> Result<Vec<T>, CoreError> {
        self.scan()?
            .into_iter()
            .filter(|row| filters.map_or(true, |f| record::matches(row, f)))
            .map(|row| self.decode(row))
            .collect()
    }

    pub fn create(&self, data: Record) -> Result<T, CoreError> {
        let row = self.adapter.insert(&self.table, data)?;
        self.decode(row)
    }

    /// Partial data is handed to the adapter as-is.
    pub fn update(&self, id: &str, data: Record) -> Result<T, CoreError> {
        let row = self.adapter.update(&self.table, id, data)?;
        self.decode(row)
    }

    pub fn delete(&self, id: &str) -> Result<(), CoreError> {
        self.adapter.delete(&self.table, id)
    }

    fn scan(&self) -> Result<Vec<Record>, CoreError> {
        self.adapter.query(&scan_all(&self.table), &[])
    }

    fn decode(&self, row: Record) -> Result<T, CoreError> {
        serde_json::from_value(Value::Object(row))
            .map_err(|e| CoreError::Backend(format!("malformed {} row: {}", self.table, e)))
    }
}
