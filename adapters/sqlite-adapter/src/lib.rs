//! sqlite-adapter — SQLite implementation of the `DatabaseAdapter` contract.
//!
//! Purpose
//! - Run the platform locally without a hosted database.
//! - Each logical table is a SQLite table holding one JSON document per row;
//!   the backend assigns `id`, `createdAt` and `updatedAt` like a hosted
//!   engine would.
//!
//! Notes
//! - Uses `rusqlite` with the `bundled` feature for portability.
//! - Tables are created on first use.
//! - The database path comes from the caller; there is no implicit default,
//!   so a missing path fails `connect()` instead of creating a stray file.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use domain::adapters::session::Session;
use domain::query::is_identifier;
use domain::record::{self, Record};
use domain::{BackendKind, CoreError, DatabaseAdapter, TableClient};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::info;

/// SQLite-backed adapter for local development.
pub struct SqliteAdapter {
    path: Option<PathBuf>,
    session: Session<SqliteClient>,
}

impl SqliteAdapter {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self::with_path(Some(path.into()))
    }

    /// `None` (or an empty path) is reported as a configuration error on
    /// `connect()`.
    pub fn with_path(path: Option<PathBuf>) -> Self {
        Self {
            path: path.filter(|p| !p.as_os_str().is_empty()),
            session: Session::new(BackendKind::Sqlite),
        }
    }
}

impl DatabaseAdapter for SqliteAdapter {
    fn connect(&self) -> Result<(), CoreError> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| CoreError::Configuration("SQLite database path is not set".into()))?;
        let client = SqliteClient::open(path)?;
        self.session.attach(Arc::new(client))?;
        info!(path = %path.display(), "sqlite adapter connected");
        Ok(())
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
        BackendKind::Sqlite
    }
}

/// An open SQLite database.
pub struct SqliteClient {
    conn: Mutex<Connection>,
}

impl SqliteClient {
    /// Open (or create) the database at `path`, creating parent directories.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        if let Some(dir) = path.as_ref().parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(|e| {
                    CoreError::Backend(format!("cannot create {}: {e}", dir.display()))
                })?;
            }
        }
        let conn = Connection::open(path).map_err(map_sqerr)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, CoreError> {
        self.conn
            .lock()
            .map_err(|_| CoreError::Backend("mutex poisoned".into()))
    }
}

fn map_sqerr<E: std::fmt::Display>(e: E) -> CoreError {
    CoreError::Backend(format!("sqlite error: {e}"))
}

fn ensure_table(conn: &Connection, table: &str) -> Result<(), CoreError> {
    if !is_identifier(table) {
        return Err(CoreError::Backend(format!("invalid table name: {table}")));
    }
    conn.execute_batch(&format!(
        r#"CREATE TABLE IF NOT EXISTS "{table}" (
            id TEXT PRIMARY KEY,
            doc TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );"#
    ))
    .map_err(map_sqerr)
}

fn decode(table: &str, doc: &str) -> Result<Record, CoreError> {
    serde_json::from_str(doc)
        .map_err(|e| CoreError::Backend(format!("malformed document in {table}: {e}")))
}

fn encode(row: &Record) -> Result<String, CoreError> {
    serde_json::to_string(row).map_err(|e| CoreError::Backend(format!("encode document: {e}")))
}

fn stamp(row: &Record, field: &str) -> String {
    row.get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

impl TableClient for SqliteClient {
    fn select_all(&self, table: &str) -> Result<Vec<Record>, CoreError> {
        let conn = self.lock()?;
        ensure_table(&conn, table)?;
        let mut stmt = conn
            .prepare(&format!(r#"SELECT doc FROM "{table}" ORDER BY rowid"#))
            .map_err(map_sqerr)?;
        let mut rows = stmt.query([]).map_err(map_sqerr)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(map_sqerr)? {
            let doc: String = row.get(0).map_err(map_sqerr)?;
            out.push(decode(table, &doc)?);
        }
        Ok(out)
    }

    fn insert_one(&self, table: &str, data: Record) -> Result<Record, CoreError> {
        let conn = self.lock()?;
        ensure_table(&conn, table)?;
        let row = record::complete_new(data, Utc::now());
        let id = record::id_of(&row).unwrap_or_default().to_string();
        let res = conn.execute(
            &format!(
                r#"INSERT INTO "{table}"(id, doc, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)"#
            ),
            params![
                id,
                encode(&row)?,
                stamp(&row, record::CREATED_AT),
                stamp(&row, record::UPDATED_AT)
            ],
        );
        match res {
            Ok(_) => Ok(row),
            Err(e) => {
                if let rusqlite::Error::SqliteFailure(err, _) = &e {
                    if err.code == rusqlite::ErrorCode::ConstraintViolation {
                        return Err(CoreError::AlreadyExists(format!("{} row {}", table, id)));
                    }
                }
                Err(map_sqerr(e))
            }
        }
    }

    fn update_by_id(&self, table: &str, id: &str, data: Record) -> Result<Record, CoreError> {
        let conn = self.lock()?;
        ensure_table(&conn, table)?;
        let tx = conn.unchecked_transaction().map_err(map_sqerr)?;
        let doc: Option<String> = tx
            .query_row(
                &format!(r#"SELECT doc FROM "{table}" WHERE id = ?1"#),
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_sqerr)?;
        let Some(doc) = doc else {
            return Err(CoreError::NotFound(format!("{} row {}", table, id)));
        };

        let mut row = decode(table, &doc)?;
        record::apply_patch(&mut row, data, Utc::now());
        tx.execute(
            &format!(r#"UPDATE "{table}" SET doc = ?1, updated_at = ?2 WHERE id = ?3"#),
            params![encode(&row)?, stamp(&row, record::UPDATED_AT), id],
        )
        .map_err(map_sqerr)?;
        tx.commit().map_err(map_sqerr)?;
        Ok(row)
    }

    fn delete_by_id(&self, table: &str, id: &str) -> Result<(), CoreError> {
        let conn = self.lock()?;
        ensure_table(&conn, table)?;
        let changed = conn
            .execute(&format!(r#"DELETE FROM "{table}" WHERE id = ?1"#), params![id])
            .map_err(map_sqerr)?;
        if changed == 0 {
            Err(CoreError::NotFound(format!("{} row {}", table, id)))
        } else {
            Ok(())
        }
    }
}
