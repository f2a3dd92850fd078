//! Registry wiring: every backend adapter, the entity repositories on the
//! configured backend, and the credential service with its collaborators.
//!
//! Nothing is constructed here; factories run on first resolution.

use std::sync::Arc;

use domain::adapters::memory::MemoryAdapter;
use domain::adapters::unimplemented::UnimplementedAdapter;
use domain::api_keys::ApiKeyRepository;
use domain::credentials::CredentialService;
use domain::projects::ProjectRepository;
use domain::registry::{deps, Registry};
use domain::users::UserRepository;
use sqlite_adapter::SqliteAdapter;
use supabase_adapter::SupabaseAdapter;
use token_auth::{Hs256Tokens, Pbkdf2Hasher};
use tracing::info;

use crate::config::Config;

pub fn build_registry(cfg: &Config) -> Registry {
    let registry = Registry::new();

    let supabase = cfg.supabase.clone();
    registry.register_factory::<deps::Supabase, _>(move || {
        Arc::new(SupabaseAdapter::new(supabase.clone()))
    });
    let supabase = cfg.supabase.clone();
    registry.register_factory::<deps::SupabaseAdmin, _>(move || {
        Arc::new(SupabaseAdapter::admin(supabase.clone()))
    });
    registry.register_factory::<deps::MongoDb, _>(|| Arc::new(UnimplementedAdapter::mongodb()));
    registry
        .register_factory::<deps::PostgreSql, _>(|| Arc::new(UnimplementedAdapter::postgresql()));
    registry.register_factory::<deps::MySql, _>(|| Arc::new(UnimplementedAdapter::mysql()));
    let db_path = cfg.db_path.clone();
    registry.register_factory::<deps::Sqlite, _>(move || {
        Arc::new(SqliteAdapter::with_path(db_path.clone()))
    });
    registry.register_factory::<deps::Memory, _>(|| Arc::new(MemoryAdapter::new()));

    let storage = cfg.storage_provider;
    registry.register_factory_with::<deps::Users, _>(move |r| {
        let adapter = r.adapter(storage)?;
        adapter.connect()?;
        info!(backend = %storage, "user repository wired");
        Ok(Arc::new(UserRepository::new(adapter)))
    });
    registry.register_factory_with::<deps::Projects, _>(move |r| {
        let adapter = r.adapter(storage)?;
        adapter.connect()?;
        Ok(Arc::new(ProjectRepository::new(adapter)))
    });
    registry.register_factory_with::<deps::ApiKeys, _>(move |r| {
        let adapter = r.adapter(storage)?;
        adapter.connect()?;
        Ok(Arc::new(ApiKeyRepository::new(adapter)))
    });

    let iterations = cfg.password_hash_iterations;
    registry.register_factory::<deps::Hasher, _>(move || Arc::new(Pbkdf2Hasher::new(iterations)));

    let secret = cfg.jwt_secret.clone();
    let ttl = cfg.jwt_expires_in;
    registry.register_factory::<deps::Tokens, _>(move || {
        Arc::new(Hs256Tokens::new(secret.as_bytes(), ttl))
    });

    registry.register_factory_with::<deps::Credentials, _>(|r| {
        Ok(Arc::new(CredentialService::new(
            r.user_repository()?,
            r.password_hasher()?,
            r.token_issuer()?,
        )))
    });

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use domain::registry::ServiceKey;
    use domain::{BackendKind, CoreError};
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let mut map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        map.entry("PASSWORD_HASH_ITERATIONS".into())
            .or_insert_with(|| "1000".into());
        Config::from_lookup(|name| map.get(name).cloned()).unwrap()
    }

    #[test]
    fn every_service_is_bound() {
        let registry = build_registry(&config(&[]));
        for kind in BackendKind::ALL {
            assert!(registry.has(ServiceKey::adapter(kind)), "{kind} missing");
        }
        for key in [
            ServiceKey::SupabaseAdminAdapter,
            ServiceKey::UserRepository,
            ServiceKey::ProjectRepository,
            ServiceKey::ApiKeyRepository,
            ServiceKey::PasswordHasher,
            ServiceKey::TokenIssuer,
            ServiceKey::CredentialService,
        ] {
            assert!(registry.has(key), "{key} missing");
        }
    }

    #[test]
    fn adapters_report_their_backend() {
        let registry = build_registry(&config(&[]));
        for kind in BackendKind::ALL {
            assert_eq!(registry.adapter(kind).unwrap().backend_kind(), kind);
        }
    }

    #[test]
    fn credential_service_is_a_singleton() {
        let registry = build_registry(&config(&[]));
        let a = registry.credential_service().unwrap();
        let b = registry.credential_service().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        let users_a = registry.user_repository().unwrap();
        let users_b = registry.user_repository().unwrap();
        assert!(Arc::ptr_eq(&users_a, &users_b));
    }

    #[test]
    fn register_login_verify_on_memory() {
        let registry = build_registry(&config(&[("JWT_SECRET", "s3cret")]));
        let credentials = registry.credential_service().unwrap();

        let user = credentials.register("a@b.c", "password").unwrap();
        assert!(user.password_hash.is_none());

        let outcome = credentials.login("a@b.c", "password").unwrap();
        let claims = credentials.verify_token(&outcome.token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.email, "a@b.c");

        assert!(matches!(
            credentials.login("a@b.c", "wrong"),
            Err(CoreError::InvalidCredentials)
        ));
        assert_eq!(credentials.verify_token("garbage"), None);
    }

    #[test]
    fn sqlite_backend_persists_between_registries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("platform.db");
        let path = path.to_str().unwrap();
        let vars = [("STORAGE_PROVIDER", "sqlite"), ("DB_PATH", path)];

        let first = build_registry(&config(&vars));
        first
            .credential_service()
            .unwrap()
            .register("a@b.c", "password")
            .unwrap();

        let second = build_registry(&config(&vars));
        let outcome = second
            .credential_service()
            .unwrap()
            .login("a@b.c", "password")
            .unwrap();
        assert_eq!(outcome.user.email, "a@b.c");
    }

    #[test]
    fn supabase_admin_needs_the_service_key() {
        let registry = build_registry(&config(&[
            ("SUPABASE_URL", "https://supabase.test"),
            ("SUPABASE_ANON_KEY", "anon-key"),
        ]));
        let admin = registry.supabase_admin().unwrap();
        assert_eq!(admin.backend_kind(), BackendKind::Supabase);
        let err = admin.connect().unwrap_err();
        assert!(matches!(err, CoreError::Configuration(_)));
        assert!(err.to_string().contains("SUPABASE_SERVICE_KEY"));

        // The anon adapter is a separate binding and connects without it.
        registry.adapter(BackendKind::Supabase).unwrap().connect().unwrap();
    }

    #[test]
    fn projects_and_keys_share_the_configured_backend() {
        let registry = build_registry(&config(&[]));
        let user = registry
            .credential_service()
            .unwrap()
            .register("owner@b.c", "password")
            .unwrap();

        let projects = registry.project_repository().unwrap();
        let mut data = domain::Record::new();
        data.insert("name".into(), "alpha".into());
        data.insert("ownerId".into(), user.id.clone().into());
        data.insert("databaseType".into(), "sqlite".into());
        let project = projects.create(data).unwrap();
        assert_eq!(projects.find_by_name("alpha", &user.id).unwrap(), Some(project.clone()));

        let keys = registry.api_key_repository().unwrap();
        let mut data = domain::Record::new();
        data.insert("name".into(), "ci".into());
        data.insert("keyHash".into(), "hash-1".into());
        data.insert("projectId".into(), project.id.clone().into());
        data.insert("userId".into(), user.id.clone().into());
        let key = keys.create(data).unwrap();
        keys.update_last_used(&key.id).unwrap();
        assert!(keys.find_by_key_hash("hash-1").unwrap().unwrap().last_used_at.is_some());

        // All three tables live in the one memory adapter.
        let storage = registry.adapter(BackendKind::Memory).unwrap();
        for table in ["users", "projects", "api_keys"] {
            let rows = storage.query(&format!("SELECT * FROM {table}"), &[]).unwrap();
            assert_eq!(rows.len(), 1, "{table}");
        }
    }

    #[test]
    fn sqlite_without_db_path_is_rejected_at_startup() {
        let map: HashMap<&str, &str> = [("STORAGE_PROVIDER", "sqlite")].into_iter().collect();
        let err = Config::from_lookup(|name| map.get(name).map(|v| v.to_string())).unwrap_err();
        assert_eq!(err.field, "DB_PATH");

        // Other backends leave the sqlite adapter unconfigured; it refuses to
        // connect instead of inventing a path.
        let registry = build_registry(&config(&[]));
        assert!(matches!(
            registry.adapter(BackendKind::Sqlite).unwrap().connect(),
            Err(CoreError::Configuration(_))
        ));
    }

    #[test]
    fn placeholder_backend_fails_on_resolution() {
        let registry = build_registry(&config(&[("STORAGE_PROVIDER", "mysql")]));
        assert!(matches!(
            registry.credential_service(),
            Err(CoreError::NotImplemented(_))
        ));
        // Not cached, so the binding is still a factory.
        assert!(registry.has(ServiceKey::CredentialService));
    }
}
