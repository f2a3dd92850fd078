//! Domain library for the platform backend.
//!
//! Holds the persistence core: the record model, the adapter contract every
//! storage engine implements, the repositories built on top of it, the typed
//! service registry used for process wiring, and the credential service.
//! Network-backed engines (Supabase, SQLite) live in their own adapter crates;
//! only the in-memory backend and the placeholder adapters live here.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use record::Record;

/// Storage engine family an adapter talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Supabase,
    MongoDb,
    PostgreSql,
    MySql,
    Sqlite,
    Memory,
}

impl BackendKind {
    pub const ALL: [BackendKind; 6] = [
        BackendKind::Supabase,
        BackendKind::MongoDb,
        BackendKind::PostgreSql,
        BackendKind::MySql,
        BackendKind::Sqlite,
        BackendKind::Memory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Supabase => "supabase",
            BackendKind::MongoDb => "mongodb",
            BackendKind::PostgreSql => "postgresql",
            BackendKind::MySql => "mysql",
            BackendKind::Sqlite => "sqlite",
            BackendKind::Memory => "memory",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "supabase" => Some(BackendKind::Supabase),
            "mongodb" | "mongo" => Some(BackendKind::MongoDb),
            "postgresql" | "postgres" => Some(BackendKind::PostgreSql),
            "mysql" => Some(BackendKind::MySql),
            "sqlite" => Some(BackendKind::Sqlite),
            "memory" => Some(BackendKind::Memory),
            _ => None,
        }
    }
}

impl Display for BackendKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform operation set every storage engine implements.
///
/// Adapters own their connection handle; every data operation issued before
/// [`DatabaseAdapter::connect`] fails with [`CoreError::NotConnected`]. Errors
/// reported by the engine are returned as-is.
pub trait DatabaseAdapter: Send + Sync {
    /// Establish the backend session. Calling it again replaces the handle.
    fn connect(&self) -> Result<(), CoreError>;
    /// Release the session. A no-op when not connected.
    fn disconnect(&self) -> Result<(), CoreError>;
    /// Run a textual query. Only `SELECT * FROM <table>` is recognized.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Record>, CoreError>;
    /// Insert one row and return it as completed by the backend.
    fn insert(&self, table: &str, data: Record) -> Result<Record, CoreError>;
    /// Apply a partial update to the row with `id` and return the stored row.
    fn update(&self, table: &str, id: &str, data: Record) -> Result<Record, CoreError>;
    /// Delete the row with `id`.
    fn delete(&self, table: &str, id: &str) -> Result<(), CoreError>;
    fn backend_kind(&self) -> BackendKind;
}

/// Native single-table primitives of a storage engine.
///
/// This is what an adapter holds once connected: `query` is translated into
/// `select_all`, the write operations are forwarded one-to-one.
pub trait TableClient: Send + Sync {
    fn select_all(&self, table: &str) -> Result<Vec<Record>, CoreError>;
    fn insert_one(&self, table: &str, data: Record) -> Result<Record, CoreError>;
    fn update_by_id(&self, table: &str, id: &str, data: Record) -> Result<Record, CoreError>;
    fn delete_by_id(&self, table: &str, id: &str) -> Result<(), CoreError>;
}

/// Core errors shared by the registry, adapters, repositories and services.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("{0} adapter is not connected")]
    NotConnected(BackendKind),
    #[error("unsupported query: {0}")]
    UnsupportedQuery(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("not implemented: {0}")]
    NotImplemented(String),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("registry binding for {0} has an unexpected type")]
    TypeMismatch(registry::ServiceKey),
    #[error("token error: {0}")]
    Token(String),
}

/// Return a short about/version line for binaries to print.
pub fn about() -> String {
    let pkg = env!("CARGO_PKG_NAME");
    let ver = env!("CARGO_PKG_VERSION");
    format!("{} v{} - persistence core loaded", pkg, ver)
}

pub mod adapters;
pub mod api_keys;
pub mod credentials;
pub mod projects;
pub mod query;
pub mod record;
pub mod registry;
pub mod repository;
pub mod users;
