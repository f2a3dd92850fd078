use serde_json::Value;

use crate::{BackendKind, CoreError, DatabaseAdapter, Record};

/// Adapter for an engine with no driver yet (MongoDB, PostgreSQL, MySQL).
///
/// Every operation fails with [`CoreError::NotImplemented`] naming the backend
/// and the operation; only `backend_kind` answers.
pub struct UnimplementedAdapter {
    kind: BackendKind,
}

impl UnimplementedAdapter {
    pub fn new(kind: BackendKind) -> Self {
        Self { kind }
    }

    pub fn mongodb() -> Self {
        Self::new(BackendKind::MongoDb)
    }

    pub fn postgresql() -> Self {
        Self::new(BackendKind::PostgreSql)
    }

    pub fn mysql() -> Self {
        Self::new(BackendKind::MySql)
    }

    fn missing<T>(&self, operation: &str) -> Result<T, CoreError> {
        Err(CoreError::NotImplemented(format!(
            "{} adapter {}",
            self.kind, operation
        )))
    }
}

impl DatabaseAdapter for UnimplementedAdapter {
    fn connect(&self) -> Result<(), CoreError> {
        self.missing("connect")
    }

    fn disconnect(&self) -> Result<(), CoreError> {
        self.missing("disconnect")
    }

    fn query(&self, _sql: &str, _params: &[Value]) -> Result<Vec<Record>, CoreError> {
        self.missing("query")
    }

    fn insert(&self, _table: &str, _data: Record) -> Result<Record, CoreError> {
        self.missing("insert")
    }

    fn update(&self, _table: &str, _id: &str, _data: Record) -> Result<Record, CoreError> {
        self.missing("update")
    }

    fn delete(&self, _table: &str, _id: &str) -> Result<(), CoreError> {
        self.missing("delete")
    }

    fn backend_kind(&self) -> BackendKind {
        self.kind
    }
}
