//! Typed, lazily constructing service registry.
//!
//! A [`Registry`] is created once during process wiring and passed by
//! reference to whoever needs a dependency. Every binding is addressed by a
//! [`ServiceKey`]; the [`Dependency`] marker types in [`deps`] tie each key to
//! the type stored under it, so lookups are checked at compile time.
//!
//! # Invariants
//! - A key holds either an instance or a factory; the last registration wins.
//! - A factory runs at most once successfully per key between [`Registry::clear`]
//!   calls, also when resolved concurrently. Its result is cached and the
//!   binding becomes an instance binding.
//! - A factory that fails leaves its binding untouched; nothing is cached.
//! - A factory must not resolve its own key.

use std::any::Any;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::api_keys::ApiKeyRepository;
use crate::credentials::{CredentialService, PasswordHasher, TokenIssuer};
use crate::projects::ProjectRepository;
use crate::users::UserRepository;
use crate::{BackendKind, CoreError, DatabaseAdapter};

/// Every dependency the platform knows how to wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ServiceKey {
    SupabaseAdapter,
    /// Supabase adapter authenticated with the service role key.
    SupabaseAdminAdapter,
    MongoDbAdapter,
    PostgreSqlAdapter,
    MySqlAdapter,
    SqliteAdapter,
    MemoryAdapter,
    UserRepository,
    ProjectRepository,
    ApiKeyRepository,
    PasswordHasher,
    TokenIssuer,
    CredentialService,
}

impl ServiceKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKey::SupabaseAdapter => "SupabaseAdapter",
            ServiceKey::SupabaseAdminAdapter => "SupabaseAdminAdapter",
            ServiceKey::MongoDbAdapter => "MongoDBAdapter",
            ServiceKey::PostgreSqlAdapter => "PostgreSQLAdapter",
            ServiceKey::MySqlAdapter => "MySQLAdapter",
            ServiceKey::SqliteAdapter => "SqliteAdapter",
            ServiceKey::MemoryAdapter => "MemoryAdapter",
            ServiceKey::UserRepository => "UserRepository",
            ServiceKey::ProjectRepository => "ProjectRepository",
            ServiceKey::ApiKeyRepository => "ApiKeyRepository",
            ServiceKey::PasswordHasher => "PasswordHasher",
            ServiceKey::TokenIssuer => "TokenIssuer",
            ServiceKey::CredentialService => "CredentialService",
        }
    }

    /// Key of the adapter for a backend family.
    pub fn adapter(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Supabase => ServiceKey::SupabaseAdapter,
            BackendKind::MongoDb => ServiceKey::MongoDbAdapter,
            BackendKind::PostgreSql => ServiceKey::PostgreSqlAdapter,
            BackendKind::MySql => ServiceKey::MySqlAdapter,
            BackendKind::Sqlite => ServiceKey::SqliteAdapter,
            BackendKind::Memory => ServiceKey::MemoryAdapter,
        }
    }
}

impl Display for ServiceKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ties a [`ServiceKey`] to the type bound under it.
pub trait Dependency: 'static {
    const KEY: ServiceKey;
    type Target: ?Sized + Send + Sync + 'static;
}

/// Marker types, one per [`ServiceKey`].
pub mod deps {
    use super::*;

    macro_rules! dependency {
        ($marker:ident, $key:ident, $target:ty) => {
            pub struct $marker;

            impl Dependency for $marker {
                const KEY: ServiceKey = ServiceKey::$key;
                type Target = $target;
            }
        };
    }

    dependency!(Supabase, SupabaseAdapter, dyn DatabaseAdapter);
    dependency!(SupabaseAdmin, SupabaseAdminAdapter, dyn DatabaseAdapter);
    dependency!(MongoDb, MongoDbAdapter, dyn DatabaseAdapter);
    dependency!(PostgreSql, PostgreSqlAdapter, dyn DatabaseAdapter);
    dependency!(MySql, MySqlAdapter, dyn DatabaseAdapter);
    dependency!(Sqlite, SqliteAdapter, dyn DatabaseAdapter);
    dependency!(Memory, MemoryAdapter, dyn DatabaseAdapter);
    dependency!(Users, UserRepository, UserRepository);
    dependency!(Projects, ProjectRepository, ProjectRepository);
    dependency!(ApiKeys, ApiKeyRepository, ApiKeyRepository);
    dependency!(Hasher, PasswordHasher, dyn PasswordHasher);
    dependency!(Tokens, TokenIssuer, dyn TokenIssuer);
    dependency!(Credentials, CredentialService, CredentialService);
}

// Values are stored as `Arc<Arc<T>>` erased to `Any`, which also covers
// unsized targets such as `dyn DatabaseAdapter`.
type Erased = Arc<dyn Any + Send + Sync>;
type Factory = Box<dyn Fn(&Registry) -> Result<Erased, CoreError> + Send + Sync>;

enum Binding {
    Instance(Erased),
    Factory(Factory),
}

struct Slot {
    binding: Mutex<Binding>,
}

impl Slot {
    fn new(binding: Binding) -> Arc<Self> {
        Arc::new(Self {
            binding: Mutex::new(binding),
        })
    }
}

fn erase<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Erased {
    Arc::new(value)
}

// Registry locks are never held across user code except the per-slot lock
// during construction, so a poisoned lock still guards consistent data.
fn recover<T>(result: std::sync::LockResult<MutexGuard<'_, T>>) -> MutexGuard<'_, T> {
    result.unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
pub struct Registry {
    slots: Mutex<HashMap<ServiceKey, Arc<Slot>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn bind(&self, key: ServiceKey, binding: Binding) {
        recover(self.slots.lock()).insert(key, Slot::new(binding));
    }

    /// Bind a ready-made instance, replacing any previous binding.
    pub fn register<D: Dependency>(&self, instance: Arc<D::Target>) {
        self.bind(D::KEY, Binding::Instance(erase(instance)));
        debug!(service = %D::KEY, "registered instance");
    }

    /// Bind a zero-argument constructor, replacing any previous binding.
    pub fn register_factory<D, F>(&self, factory: F)
    where
        D: Dependency,
        F: Fn() -> Arc<D::Target> + Send + Sync + 'static,
    {
        self.bind(
            D::KEY,
            Binding::Factory(Box::new(move |_: &Registry| {
                Ok::<_, CoreError>(erase(factory()))
            })),
        );
        debug!(service = %D::KEY, "registered factory");
    }

    /// Bind a fallible constructor that may resolve other dependencies.
    pub fn register_factory_with<D, F>(&self, factory: F)
    where
        D: Dependency,
        F: Fn(&Registry) -> Result<Arc<D::Target>, CoreError> + Send + Sync + 'static,
    {
        self.bind(
            D::KEY,
            Binding::Factory(Box::new(move |registry: &Registry| {
                factory(registry).map(erase)
            })),
        );
        debug!(service = %D::KEY, "registered factory");
    }

    /// Return the instance bound under `D`, constructing it on first use.
    pub fn resolve<D: Dependency>(&self) -> Result<Arc<D::Target>, CoreError> {
        let key = D::KEY;
        let slot = recover(self.slots.lock()).get(&key).cloned();
        let Some(slot) = slot else {
            debug!(service = %key, "service missing");
            return Err(CoreError::NotFound(format!("service \"{}\"", key)));
        };

        let mut binding = recover(slot.binding.lock());
        let erased = match &*binding {
            Binding::Instance(instance) => {
                debug!(service = %key, "resolved cached instance");
                Arc::clone(instance)
            }
            Binding::Factory(factory) => {
                let built = factory(self)?;
                *binding = Binding::Instance(Arc::clone(&built));
                debug!(service = %key, "constructed from factory");
                built
            }
        };
        drop(binding);

        erased
            .downcast_ref::<Arc<D::Target>>()
            .cloned()
            .ok_or(CoreError::TypeMismatch(key))
    }

    /// True when an instance or a factory is bound under `key`.
    pub fn has(&self, key: ServiceKey) -> bool {
        recover(self.slots.lock()).contains_key(&key)
    }

    /// Drop every binding. Previously resolved instances stay alive with
    /// their holders but are no longer reachable through the registry.
    pub fn clear(&self) {
        recover(self.slots.lock()).clear();
        debug!("registry cleared");
    }

    pub fn adapter(&self, kind: BackendKind) -> Result<Arc<dyn DatabaseAdapter>, CoreError> {
        match kind {
            BackendKind::Supabase => self.resolve::<deps::Supabase>(),
            BackendKind::MongoDb => self.resolve::<deps::MongoDb>(),
            BackendKind::PostgreSql => self.resolve::<deps::PostgreSql>(),
            BackendKind::MySql => self.resolve::<deps::MySql>(),
            BackendKind::Sqlite => self.resolve::<deps::Sqlite>(),
            BackendKind::Memory => self.resolve::<deps::Memory>(),
        }
    }

    /// The service-role Supabase adapter, for writes that bypass row level
    /// security.
    pub fn supabase_admin(&self) -> Result<Arc<dyn DatabaseAdapter>, CoreError> {
        self.resolve::<deps::SupabaseAdmin>()
    }

    pub fn user_repository(&self) -> Result<Arc<UserRepository>, CoreError> {
        self.resolve::<deps::Users>()
    }

    pub fn project_repository(&self) -> Result<Arc<ProjectRepository>, CoreError> {
        self.resolve::<deps::Projects>()
    }

    pub fn api_key_repository(&self) -> Result<Arc<ApiKeyRepository>, CoreError> {
        self.resolve::<deps::ApiKeys>()
    }

    pub fn password_hasher(&self) -> Result<Arc<dyn PasswordHasher>, CoreError> {
        self.resolve::<deps::Hasher>()
    }

    pub fn token_issuer(&self) -> Result<Arc<dyn TokenIssuer>, CoreError> {
        self.resolve::<deps::Tokens>()
    }

    pub fn credential_service(&self) -> Result<Arc<CredentialService>, CoreError> {
        self.resolve::<deps::Credentials>()
    }
}
