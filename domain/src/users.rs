use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::record::Record;
use crate::repository::{Entity, Repository};
use crate::{CoreError, DatabaseAdapter};

/// Account tier of a platform user.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserTier {
    #[default]
    Casual,
    Power,
    Enterprise,
}

impl UserTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserTier::Casual => "casual",
            UserTier::Power => "power",
            UserTier::Enterprise => "enterprise",
        }
    }
}

/// Platform user as persisted in the `users` table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_email_verified: bool,
    #[serde(default)]
    pub tier: UserTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl User {
    /// The same user with the password hash removed, for returning to callers.
    pub fn without_secret(mut self) -> Self {
        self.password_hash = None;
        self
    }
}

impl Entity for User {
    const TABLE: &'static str = "users";
}

/// User-specific finders and writes on top of [`Repository<User>`].
pub struct UserRepository {
    records: Repository<User>,
}

impl UserRepository {
    pub fn new(adapter: Arc<dyn DatabaseAdapter>) -> Self {
        Self {
            records: Repository::new(adapter),
        }
    }

    pub fn records(&self) -> &Repository<User> {
        &self.records
    }

    pub fn find_by_id(&self, id: &str) -> Result<Option<User>, CoreError> {
        self.records.find_by_id(id)
    }

    pub fn find_all(&self, filters: Option<&Record>) -> Result<Vec<User>, CoreError> {
        self.records.find_all(filters)
    }

    pub fn find_by_email(&self, email: &str) -> Result<Option<User>, CoreError> {
        self.records
            .find_by_field("email", &Value::String(email.to_string()))
    }

    pub fn create(&self, data: Record) -> Result<User, CoreError> {
        self.records.create(data)
    }

    pub fn update(&self, id: &str, data: Record) -> Result<User, CoreError> {
        self.records.update(id, data)
    }

    pub fn delete(&self, id: &str) -> Result<(), CoreError> {
        self.records.delete(id)
    }

    pub fn update_password(&self, user_id: &str, password_hash: &str) -> Result<(), CoreError> {
        self.records
            .update(user_id, single("passwordHash", json!(password_hash)))
            .map(|_| ())
    }

    pub fn verify_email(&self, user_id: &str) -> Result<(), CoreError> {
        self.records
            .update(user_id, single("isEmailVerified", json!(true)))
            .map(|_| ())
    }
}

fn single(field: &str, value: Value) -> Record {
    let mut data = Record::new();
    data.insert(field.to_string(), value);
    data
}
