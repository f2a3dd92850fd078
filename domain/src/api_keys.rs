//! Project API keys. Only a hash of the key is ever persisted.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::{self, Record};
use crate::repository::{Entity, Repository};
use crate::{CoreError, DatabaseAdapter};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Create,
    Read,
    Update,
    Delete,
    Manage,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKey {
    pub id: String,
    pub name: String,
    pub key_hash: String,
    pub project_id: String,
    pub user_id: String,
    #[serde(default)]
    pub permissions: Vec<Permission>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl Entity for ApiKey {
    const TABLE: &'static str = "api_keys";
}

pub struct ApiKeyRepository {
    records: Repository<ApiKey>,
}

impl ApiKeyRepository {
    pub fn new(adapter: Arc<dyn DatabaseAdapter>) -> Self {
        Self {
            records: Repository::new(adapter),
        }
    }

    pub fn find_by_id(&self, id: &str) -> Result<Option<ApiKey>, CoreError> {
        self.records.find_by_id(id)
    }

    pub fn find_all(&self, filters: Option<&Record>) -> Result<Vec<ApiKey>, CoreError> {
        self.records.find_all(filters)
    }

    pub fn find_by_key_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, CoreError> {
        self.records
            .find_by_field("keyHash", &Value::String(key_hash.to_string()))
    }

    pub fn find_by_project_id(&self, project_id: &str) -> Result<Vec<ApiKey>, CoreError> {
        self.find_where("projectId", project_id)
    }

    pub fn find_by_user_id(&self, user_id: &str) -> Result<Vec<ApiKey>, CoreError> {
        self.find_where("userId", user_id)
    }

    pub fn create(&self, data: Record) -> Result<ApiKey, CoreError> {
        self.records.create(data)
    }

    pub fn update(&self, id: &str, data: Record) -> Result<ApiKey, CoreError> {
        self.records.update(id, data)
    }

    pub fn delete(&self, id: &str) -> Result<(), CoreError> {
        self.records.delete(id)
    }

    /// Stamp `lastUsedAt` with the current time.
    pub fn update_last_used(&self, key_id: &str) -> Result<(), CoreError> {
        let mut data = Record::new();
        data.insert("lastUsedAt".into(), record::timestamp(Utc::now()));
        self.records.update(key_id, data).map(|_| ())
    }

    fn find_where(&self, field: &str, value: &str) -> Result<Vec<ApiKey>, CoreError> {
        let mut filters = Record::new();
        filters.insert(field.to_string(), Value::String(value.to_string()));
        self.records.find_all(Some(&filters))
    }
}
