//! supabase-adapter — Supabase implementation of the `DatabaseAdapter` contract.
//!
//! Purpose
//! - Reference adapter: translates the textual `SELECT * FROM <table>` query
//!   into a PostgREST table scan and forwards inserts, updates and deletes to
//!   the matching single-row REST calls.
//! - `connect()` validates the endpoint and key and builds the HTTP client;
//!   no request is sent until the first operation.
//!
//! Configuration
//! - Built by the caller as a `SupabaseConfig`; the binary fills it from
//!   `SUPABASE_URL`, `SUPABASE_ANON_KEY`, `SUPABASE_SERVICE_KEY` and
//!   `SUPABASE_TIMEOUT_SECS`.
//! - The service key is required only for the admin adapter.
//! - Missing values are reported by `connect()` as `CoreError::Configuration`.
//!
//! Notes
//! - Uses `reqwest::blocking`; the adapter contract is synchronous.
//! - Responses with a non-2xx status are returned as `CoreError::Backend`
//!   carrying the status and the PostgREST message.

use std::sync::Arc;
use std::time::Duration;

use domain::adapters::session::Session;
use domain::query::is_identifier;
use domain::{BackendKind, CoreError, DatabaseAdapter, Record, TableClient};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_RANGE};
use serde_json::Value;
use tracing::{debug, info};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection parameters. Missing values are only reported by `connect()`.
#[derive(Clone, Debug, Default)]
pub struct SupabaseConfig {
    pub url: Option<String>,
    pub anon_key: Option<String>,
    pub service_key: Option<String>,
    pub timeout: Option<Duration>,
}

impl SupabaseConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            anon_key: Some(anon_key.into()),
            ..Self::default()
        }
    }

    pub fn with_service_key(mut self, key: impl Into<String>) -> Self {
        self.service_key = Some(key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Which key the adapter authenticates with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyRole {
    Anon,
    /// Service role key, bypasses row level security.
    Service,
}

/// Validated endpoint handed to a connector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub url: String,
    pub key: String,
    pub timeout: Duration,
}

impl Endpoint {
    fn resolve(config: &SupabaseConfig, role: KeyRole) -> Result<Self, CoreError> {
        let url = config.url.clone().ok_or_else(|| {
            CoreError::Configuration("Supabase configuration is missing SUPABASE_URL".into())
        })?;
        let key = match role {
            KeyRole::Anon => config.anon_key.clone().ok_or_else(|| {
                CoreError::Configuration(
                    "Supabase configuration is missing SUPABASE_ANON_KEY".into(),
                )
            })?,
            KeyRole::Service => config.service_key.clone().ok_or_else(|| {
                CoreError::Configuration(
                    "Supabase admin configuration is missing SUPABASE_SERVICE_KEY".into(),
                )
            })?,
        };
        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            key,
            timeout: config.timeout.unwrap_or(DEFAULT_TIMEOUT),
        })
    }
}

type Connector<C> = Box<dyn Fn(&Endpoint) -> Result<C, CoreError> + Send + Sync>;

/// Supabase adapter. Generic over the table client so tests can substitute
/// the HTTP layer; production code uses [`RestClient`].
pub struct SupabaseAdapter<C: TableClient = RestClient> {
    config: SupabaseConfig,
    role: KeyRole,
    connector: Connector<C>,
    session: Session<C>,
}

impl SupabaseAdapter<RestClient> {
    pub fn new(config: SupabaseConfig) -> Self {
        Self::with_connector(config, KeyRole::Anon, RestClient::connect)
    }

    /// Adapter authenticating with the service role key.
    pub fn admin(config: SupabaseConfig) -> Self {
        Self::with_connector(config, KeyRole::Service, RestClient::connect)
    }
}

impl<C: TableClient> SupabaseAdapter<C> {
    pub fn with_connector<F>(config: SupabaseConfig, role: KeyRole, connector: F) -> Self
    where
        F: Fn(&Endpoint) -> Result<C, CoreError> + Send + Sync + 'static,
    {
        Self {
            config,
            role,
            connector: Box::new(connector),
            session: Session::new(BackendKind::Supabase),
        }
    }

    pub fn role(&self) -> KeyRole {
        self.role
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }
}

impl<C: TableClient> DatabaseAdapter for SupabaseAdapter<C> {
    fn connect(&self) -> Result<(), CoreError> {
        let endpoint = Endpoint::resolve(&self.config, self.role)?;
        let client = (self.connector)(&endpoint)?;
        self.session.attach(Arc::new(client))?;
        info!(url = %endpoint.url, role = ?self.role, "supabase adapter connected");
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
        BackendKind::Supabase
    }
}

/// PostgREST client for one Supabase project.
pub struct RestClient {
    http: Client,
    base: String,
}

impl RestClient {
    pub fn connect(endpoint: &Endpoint) -> Result<Self, CoreError> {
        let key = HeaderValue::from_str(&endpoint.key)
            .map_err(|_| CoreError::Configuration("Supabase key is not a valid header".into()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", endpoint.key))
            .map_err(|_| CoreError::Configuration("Supabase key is not a valid header".into()))?;
        let mut headers = HeaderMap::new();
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let http = Client::builder()
            .default_headers(headers)
            .timeout(endpoint.timeout)
            .build()
            .map_err(|e| CoreError::Backend(format!("supabase client: {e}")))?;
        Ok(Self {
            http,
            base: format!("{}/rest/v1", endpoint.url),
        })
    }

    fn table_url(&self, table: &str) -> Result<String, CoreError> {
        if !is_identifier(table) {
            return Err(CoreError::Backend(format!("invalid table name: {table}")));
        }
        Ok(format!("{}/{}", self.base, table))
    }

    fn row_url(&self, table: &str, id: &str) -> Result<String, CoreError> {
        Ok(format!(
            "{}?id=eq.{}",
            self.table_url(table)?,
            urlencoding::encode(id)
        ))
    }

    fn send(request: RequestBuilder) -> Result<Response, CoreError> {
        let resp = request
            .send()
            .map_err(|e| CoreError::Backend(format!("supabase request failed: {e}")))?;
        check_status(resp)
    }

    fn send_rows(request: RequestBuilder) -> Result<Vec<Record>, CoreError> {
        Self::send(request)?
            .json::<Vec<Record>>()
            .map_err(|e| CoreError::Backend(format!("supabase response: {e}")))
    }
}

/// Total from a counted response's `Content-Range` (`*/1`, `0-0/1`).
/// `None` when the header is absent or the total is unknown (`*`).
fn counted_rows(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_RANGE)?
        .to_str()
        .ok()?
        .rsplit('/')
        .next()?
        .trim()
        .parse()
        .ok()
}

fn check_status(resp: Response) -> Result<Response, CoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    Err(CoreError::Backend(format!(
        "supabase {}: {}",
        status.as_u16(),
        error_message(&body)
    )))
}

/// PostgREST error bodies are JSON with a `message`; fall back to the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

impl TableClient for RestClient {
    fn select_all(&self, table: &str) -> Result<Vec<Record>, CoreError> {
        let url = format!("{}?select=*", self.table_url(table)?);
        debug!(%url, "GET");
        Self::send_rows(self.http.get(url))
    }

    fn insert_one(&self, table: &str, data: Record) -> Result<Record, CoreError> {
        let url = self.table_url(table)?;
        let rows = Self::send_rows(
            self.http
                .post(url)
                .header("Prefer", "return=representation")
                .json(&data),
        )?;
        rows.into_iter()
            .next()
            .ok_or_else(|| CoreError::Backend(format!("supabase returned no row for insert into {table}")))
    }

    fn update_by_id(&self, table: &str, id: &str, data: Record) -> Result<Record, CoreError> {
        let url = self.row_url(table, id)?;
        let rows = Self::send_rows(
            self.http
                .patch(url)
                .header("Prefer", "return=representation")
                .json(&data),
        )?;
        rows.into_iter()
            .next()
            .ok_or_else(|| CoreError::NotFound(format!("{} row {}", table, id)))
    }

    // The affected-row count is asked for instead of the deleted rows: under
    // row level security a row may be deletable without being readable back.
    fn delete_by_id(&self, table: &str, id: &str) -> Result<(), CoreError> {
        let url = self.row_url(table, id)?;
        debug!(%url, "DELETE");
        let resp = Self::send(
            self.http
                .delete(url)
                .header("Prefer", "return=minimal, count=exact"),
        )?;
        match counted_rows(resp.headers()) {
            Some(0) => Err(CoreError::NotFound(format!("{} row {}", table, id))),
            _ => Ok(()),
        }
    }
}
