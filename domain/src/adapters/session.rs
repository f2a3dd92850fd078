use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::debug;

use crate::query::QueryShape;
use crate::{BackendKind, CoreError, Record, TableClient};

/// Connection handle owned by one adapter.
///
/// Holds the connected client, if any, and routes the adapter contract onto
/// the client's native primitives. The lock only guards the handle itself;
/// client calls run after it is released.
pub struct Session<C: TableClient> {
    kind: BackendKind,
    handle: RwLock<Option<Arc<C>>>,
}

impl<C: TableClient> Session<C> {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            handle: RwLock::new(None),
        }
    }

    /// Install a client, replacing any previous one.
    pub fn attach(&self, client: Arc<C>) -> Result<(), CoreError> {
        let mut handle = self
            .handle
            .write()
            .map_err(|_| CoreError::Backend("connection handle poisoned".into()))?;
        if handle.replace(client).is_some() {
            debug!(backend = %self.kind, "replaced existing connection handle");
        }
        Ok(())
    }

    /// Drop the client, if any.
    pub fn detach(&self) -> Result<(), CoreError> {
        let mut handle = self
            .handle
            .write()
            .map_err(|_| CoreError::Backend("connection handle poisoned".into()))?;
        *handle = None;
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.handle.read().map(|h| h.is_some()).unwrap_or(false)
    }

    /// The connected client, or `NotConnected`.
    pub fn client(&self) -> Result<Arc<C>, CoreError> {
        let handle = self
            .handle
            .read()
            .map_err(|_| CoreError::Backend("connection handle poisoned".into()))?;
        handle.clone().ok_or(CoreError::NotConnected(self.kind))
    }

    pub fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Record>, CoreError> {
        let client = self.client()?;
        match QueryShape::parse(sql) {
            QueryShape::ScanAll { table } => {
                debug!(backend = %self.kind, %table, params = params.len(), "table scan");
                client.select_all(&table)
            }
            QueryShape::Unsupported => Err(CoreError::UnsupportedQuery(sql.to_string())),
        }
    }

    pub fn insert(&self, table: &str, data: Record) -> Result<Record, CoreError> {
        let client = self.client()?;
        debug!(backend = %self.kind, %table, "insert");
        client.insert_one(table, data)
    }

    pub fn update(&self, table: &str, id: &str, data: Record) -> Result<Record, CoreError> {
        let client = self.client()?;
        debug!(backend = %self.kind, %table, %id, "update");
        client.update_by_id(table, id, data)
    }

    pub fn delete(&self, table: &str, id: &str) -> Result<(), CoreError> {
        let client = self.client()?;
        debug!(backend = %self.kind, %table, %id, "delete");
        client.delete_by_id(table, id)
    }
}
