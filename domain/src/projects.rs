use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::Record;
use crate::repository::{Entity, Repository};
use crate::{BackendKind, CoreError, DatabaseAdapter};

/// A tenant project and the database it is provisioned on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub owner_id: String,
    pub database_type: BackendKind,
    #[serde(default)]
    pub database_config: Value,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl Entity for Project {
    const TABLE: &'static str = "projects";
}

pub struct ProjectRepository {
    records: Repository<Project>,
}

impl ProjectRepository {
    pub fn new(adapter: Arc<dyn DatabaseAdapter>) -> Self {
        Self {
            records: Repository::new(adapter),
        }
    }

    pub fn find_by_id(&self, id: &str) -> Result<Option<Project>, CoreError> {
        self.records.find_by_id(id)
    }

    pub fn find_all(&self, filters: Option<&Record>) -> Result<Vec<Project>, CoreError> {
        self.records.find_all(filters)
    }

    pub fn find_by_owner_id(&self, owner_id: &str) -> Result<Vec<Project>, CoreError> {
        let mut filters = Record::new();
        filters.insert("ownerId".into(), Value::String(owner_id.to_string()));
        self.records.find_all(Some(&filters))
    }

    /// Project names are unique per owner, not globally.
    pub fn find_by_name(&self, name: &str, owner_id: &str) -> Result<Option<Project>, CoreError> {
        let mut filters = Record::new();
        filters.insert("name".into(), Value::String(name.to_string()));
        filters.insert("ownerId".into(), Value::String(owner_id.to_string()));
        Ok(self.records.find_all(Some(&filters))?.into_iter().next())
    }

    pub fn create(&self, data: Record) -> Result<Project, CoreError> {
        self.records.create(data)
    }

    pub fn update(&self, id: &str, data: Record) -> Result<Project, CoreError> {
        self.records.update(id, data)
    }

    pub fn delete(&self, id: &str) -> Result<(), CoreError> {
        self.records.delete(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryAdapter;
    use serde_json::json;

    fn obj(v: Value) -> Record {
        match v {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    fn new_project(name: &str, owner: &str) -> Record {
        obj(json!({
            "name": name,
            "ownerId": owner,
            "databaseType": "supabase",
            "databaseConfig": {"schema": "public"},
        }))
    }

    #[test]
    fn create_fills_defaults() {
        let projects = ProjectRepository::new(Arc::new(MemoryAdapter::connected()));
        let created = projects.create(new_project("alpha", "u1")).unwrap();
        assert_eq!(created.database_type, BackendKind::Supabase);
        assert!(created.is_active);
        assert_eq!(created.database_config, json!({"schema": "public"}));
        assert_eq!(projects.find_by_id(&created.id).unwrap(), Some(created));
    }

    #[test]
    fn find_by_owner_id_returns_only_owned_projects() {
        let projects = ProjectRepository::new(Arc::new(MemoryAdapter::connected()));
        projects.create(new_project("alpha", "u1")).unwrap();
        projects.create(new_project("beta", "u1")).unwrap();
        projects.create(new_project("gamma", "u2")).unwrap();

        let names: Vec<String> = projects
            .find_by_owner_id("u1")
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["alpha", "beta"]);
        assert!(projects.find_by_owner_id("nobody").unwrap().is_empty());
        assert_eq!(projects.find_all(None).unwrap().len(), 3);
    }

    #[test]
    fn find_by_name_is_scoped_to_owner() {
        let projects = ProjectRepository::new(Arc::new(MemoryAdapter::connected()));
        let mine = projects.create(new_project("shared", "u1")).unwrap();
        let theirs = projects.create(new_project("shared", "u2")).unwrap();

        assert_eq!(projects.find_by_name("shared", "u1").unwrap(), Some(mine));
        assert_eq!(projects.find_by_name("shared", "u2").unwrap(), Some(theirs));
        assert_eq!(projects.find_by_name("shared", "u3").unwrap(), None);
        assert_eq!(projects.find_by_name("other", "u1").unwrap(), None);
    }

    #[test]
    fn update_and_delete() {
        let projects = ProjectRepository::new(Arc::new(MemoryAdapter::connected()));
        let created = projects.create(new_project("alpha", "u1")).unwrap();
        let updated = projects
            .update(&created.id, obj(json!({"isActive": false})))
            .unwrap();
        assert!(!updated.is_active);
        assert_eq!(updated.name, "alpha");

        projects.delete(&created.id).unwrap();
        assert_eq!(projects.find_by_id(&created.id).unwrap(), None);
        assert!(matches!(
            projects.delete(&created.id),
            Err(CoreError::NotFound(_))
        ));
    }
}
