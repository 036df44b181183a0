//! # The Container — per-unit-of-work service cache and cleanup coordinator.
//!
//! One container is created per unit of work (typically one HTTP
//! request), bound to the application's [`Registry`].
//!
//! # Lifecycle
//! ```text
//! Registry  ──new()──>  Container
//!    ▲                      │
//!    │ lookup          get()/aget()
//!    │                      │
//!    └──────────────────────┤  instantiate, cache, record cleanup
//!                           │
//!                       close()/aclose()
//!                           │
//!                           ▼
//!          cleanups run in reverse acquisition order
//! ```
//!
//! # Examples
//! ```rust
//! use khidma_container::prelude::*;
//! use std::sync::Arc;
//!
//! struct Database {
//!     url: String,
//! }
//!
//! let registry = Arc::new(Registry::new());
//! registry.register_factory::<Database>(|_| {
//!     Ok(Produced::plain(Database {
//!         url: "postgres://localhost".into(),
//!     }))
//! });
//!
//! let container = Container::new(Arc::clone(&registry));
//! let db = container.get::<Database>().expect("failed to resolve");
//! assert_eq!(db.url, "postgres://localhost");
//! container.close();
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::cleanup::{CleanupEntry, Instance, Produced, aadapt, adapt};
use crate::error::{BoxError, KhidmaError, Result, ServiceNotFoundError};
use crate::key::ServiceKey;
use crate::ping::ServicePing;
use crate::record::{Record, Registration, ServiceSource};
use crate::registry::Registry;

#[derive(Default)]
struct State {
    cache: HashMap<ServiceKey, Instance>,
    cleanups: Vec<CleanupEntry>,
}

/// A per-unit-of-work container for instantiated services and cleanups.
///
/// Guarantees:
/// - at most one cached instance per key; repeated lookups return clones
///   of the same `Arc` without re-invoking the factory,
/// - cleanups run in strict reverse acquisition order on close,
/// - closing is idempotent and resets the container for reuse.
///
/// A container is meant for exactly one task or request at a time; it is
/// `Send + Sync` so it can move across await points, but sharing one
/// container between concurrent units of work is a usage error.
///
/// Dropping a container with pending cleanups only logs a warning —
/// always close explicitly or go through [`Container::scope`].
pub struct Container {
    registry: Arc<Registry>,
    local: OnceCell<Registry>,
    state: Mutex<State>,
}

impl Container {
    /// Creates a container bound to `registry`.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            local: OnceCell::new(),
            state: Mutex::new(State::default()),
        }
    }

    /// The registry this container resolves against.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    // ── Resolution ──

    fn resolve_record(&self, key: &ServiceKey) -> Result<Arc<Record>> {
        if let Some(local) = self.local.get() {
            if let Some(record) = local.lookup(key) {
                return Ok(record);
            }
        }
        self.registry.lookup(key).ok_or_else(|| {
            KhidmaError::NotFound(ServiceNotFoundError {
                requested: key.clone(),
                suggestions: self.find_suggestions(key),
            })
        })
    }

    fn find_suggestions(&self, key: &ServiceKey) -> Vec<ServiceKey> {
        let target = key.type_name().to_lowercase();
        let mut keys = self.registry.iterate();
        if let Some(local) = self.local.get() {
            keys.extend(local.iterate());
        }
        keys.into_iter()
            .filter(|k| {
                if k == key {
                    return false;
                }
                let name = k.type_name().to_lowercase();
                name.contains(&target) || target.contains(&name)
            })
            .collect()
    }

    fn cached(&self, key: &ServiceKey) -> Option<Instance> {
        self.state.lock().cache.get(key).cloned()
    }

    // The cache insert and the cleanup push happen under one lock
    // acquisition: a cancelled `aget` can never leave a cleanup entry
    // for an instance that was not cached, or vice versa.
    fn store(&self, key: ServiceKey, instance: Instance, cleanup: Option<CleanupEntry>) {
        let mut state = self.state.lock();
        state.cache.insert(key, instance);
        if let Some(entry) = cleanup {
            state.cleanups.push(entry);
        }
    }

    // ── Retrieval ──

    /// Gets the service for `key` as a type-erased instance.
    ///
    /// Instantiates it if necessary and records its cleanup. This is the
    /// variant to reach for with abstract targets; [`Container::get`]
    /// is the typed sugar over it.
    pub fn get_erased(&self, key: &ServiceKey) -> Result<Instance> {
        if let Some(instance) = self.cached(key) {
            return Ok(instance);
        }

        let record = self.resolve_record(key)?;
        trace!(key = %key, "instantiating service");

        let produced = match &record.source {
            ServiceSource::Value(value) => Produced::Plain(Arc::clone(value)),
            ServiceSource::Factory(factory) => {
                factory(self).map_err(|source| KhidmaError::ConstructionFailed {
                    key: key.clone(),
                    source,
                })?
            }
            ServiceSource::AsyncFactory(_) => {
                return Err(KhidmaError::AsyncRequired { key: key.clone() });
            }
        };

        let (instance, cleanup) = adapt(key, produced, record.auto_enter)?;
        self.store(key.clone(), Arc::clone(&instance), cleanup);
        Ok(instance)
    }

    /// Async variant of [`Container::get_erased`].
    ///
    /// Accepts sync and async registrations uniformly; synchronous
    /// scoped resources encountered here are still entered synchronously.
    pub async fn aget_erased(&self, key: &ServiceKey) -> Result<Instance> {
        if let Some(instance) = self.cached(key) {
            return Ok(instance);
        }

        let record = self.resolve_record(key)?;
        trace!(key = %key, "instantiating service");

        let produced = match &record.source {
            ServiceSource::Value(value) => Produced::Plain(Arc::clone(value)),
            ServiceSource::Factory(factory) => {
                factory(self).map_err(|source| KhidmaError::ConstructionFailed {
                    key: key.clone(),
                    source,
                })?
            }
            ServiceSource::AsyncFactory(factory) => factory(self).await.map_err(|source| {
                KhidmaError::ConstructionFailed {
                    key: key.clone(),
                    source,
                }
            })?,
        };

        let (instance, cleanup) = aadapt(key, produced, record.auto_enter).await?;
        self.store(key.clone(), Arc::clone(&instance), cleanup);
        Ok(instance)
    }

    /// Gets the service registered for type `T`.
    ///
    /// ```rust,ignore
    /// let db: Arc<Database> = container.get()?;
    /// ```
    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.get_keyed(ServiceKey::of::<T>())
    }

    /// Gets the service for an explicit (possibly named) key.
    pub fn get_keyed<T: Send + Sync + 'static>(&self, key: ServiceKey) -> Result<Arc<T>> {
        let instance = self.get_erased(&key)?;
        instance
            .downcast::<T>()
            .map_err(|_| KhidmaError::TypeMismatch {
                key,
                expected: std::any::type_name::<T>(),
            })
    }

    /// Gets several services in one call, one result per key, in
    /// argument order. Each key goes through the regular per-key cache.
    pub fn get_many(&self, keys: &[ServiceKey]) -> Result<Vec<Instance>> {
        keys.iter().map(|key| self.get_erased(key)).collect()
    }

    /// Async variant of [`Container::get`].
    pub async fn aget<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.aget_keyed(ServiceKey::of::<T>()).await
    }

    /// Async variant of [`Container::get_keyed`].
    pub async fn aget_keyed<T: Send + Sync + 'static>(&self, key: ServiceKey) -> Result<Arc<T>> {
        let instance = self.aget_erased(&key).await?;
        instance
            .downcast::<T>()
            .map_err(|_| KhidmaError::TypeMismatch {
                key,
                expected: std::any::type_name::<T>(),
            })
    }

    /// Async variant of [`Container::get_many`].
    pub async fn aget_many(&self, keys: &[ServiceKey]) -> Result<Vec<Instance>> {
        let mut instances = Vec::with_capacity(keys.len());
        for key in keys {
            instances.push(self.aget_erased(key).await?);
        }
        Ok(instances)
    }

    // ── Local registrations ──

    fn local_registry(&self) -> &Registry {
        self.local.get_or_init(Registry::new)
    }

    /// Registers `registration` for this container only.
    ///
    /// A private registry is created lazily and consulted before the
    /// global one for every subsequent lookup; it is closed together
    /// with this container.
    pub fn register_local(&self, key: ServiceKey, registration: Registration) {
        self.local_registry().register(key, registration);
    }

    /// Like [`Registry::register_factory`], scoped to this container.
    pub fn register_local_factory<T: Send + Sync + 'static>(
        &self,
        factory: impl Fn(&Container) -> std::result::Result<Produced, BoxError>
            + Send
            + Sync
            + 'static,
    ) {
        self.local_registry().register_factory::<T>(factory);
    }

    /// Like [`Registry::register_async_factory`], scoped to this container.
    pub fn register_local_async_factory<T: Send + Sync + 'static>(
        &self,
        factory: impl for<'a> Fn(&'a Container) -> BoxFuture<'a, std::result::Result<Produced, BoxError>>
            + Send
            + Sync
            + 'static,
    ) {
        self.local_registry().register_async_factory::<T>(factory);
    }

    /// Like [`Registry::register_value`], scoped to this container.
    pub fn register_local_value<T: Send + Sync + 'static>(&self, value: T) {
        self.local_registry().register_value(value);
    }

    // ── Introspection ──

    /// Whether this container holds a cached instance for `key`.
    ///
    /// Note this is about *instantiated* services, not registrations;
    /// use [`Registry::contains`] for the latter.
    pub fn contains_key(&self, key: &ServiceKey) -> bool {
        self.state.lock().cache.contains_key(key)
    }

    /// Like [`Container::contains_key`], keyed by type.
    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.contains_key(&ServiceKey::of::<T>())
    }

    /// One [`ServicePing`] per registration that declares a ping,
    /// bound to this container.
    ///
    /// The local registry takes precedence: a local record with a ping
    /// replaces the global one, and a local record *without* a ping
    /// suppresses the global ping for that key entirely.
    pub fn get_pings(&self) -> Vec<ServicePing<'_>> {
        let mut pings = Vec::new();
        let mut seen = HashSet::new();

        if let Some(local) = self.local.get() {
            for (key, record) in local.snapshot_records() {
                seen.insert(key.clone());
                pings.extend(ServicePing::new(key, &record, self));
            }
        }
        for (key, record) in self.registry.snapshot_records() {
            if !seen.contains(&key) {
                pings.extend(ServicePing::new(key, &record, self));
            }
        }

        pings
    }

    // ── Teardown ──

    /// Runs all *synchronous* cleanups in reverse acquisition order,
    /// clears the cache, and closes the local registry.
    ///
    /// Async cleanups are *not* awaited; they are skipped with a warning
    /// — use [`Container::aclose`] instead. Cleanup failures are logged
    /// at warning level and do not stop the remaining entries.
    ///
    /// Idempotent, and the container is ready for reuse afterwards:
    /// closing is also how you reset it.
    pub fn close(&self) {
        let cleanups = {
            let mut state = self.state.lock();
            state.cache.clear();
            std::mem::take(&mut state.cleanups)
        };

        for entry in cleanups.into_iter().rev() {
            if entry.is_async() {
                warn!(key = %entry.key, "skipped async cleanup; use `aclose()`");
                continue;
            }
            let key = entry.key.clone();
            if let Err(error) = entry.release() {
                warn!(key = %key, %error, "cleanup failed");
            }
        }

        if let Some(local) = self.local.get() {
            local.close();
        }
    }

    /// Runs *all* cleanups — synchronous and asynchronous — in reverse
    /// acquisition order, clears the cache, and closes the local
    /// registry.
    ///
    /// Cleanup failures are logged at warning level and do not stop the
    /// remaining entries. Idempotent; the container is reusable
    /// afterwards.
    pub async fn aclose(&self) {
        let cleanups = {
            let mut state = self.state.lock();
            state.cache.clear();
            std::mem::take(&mut state.cleanups)
        };

        for entry in cleanups.into_iter().rev() {
            let key = entry.key.clone();
            if let Err(error) = entry.arelease().await {
                warn!(key = %key, %error, "cleanup failed");
            }
        }

        if let Some(local) = self.local.get() {
            local.aclose().await;
        }
    }

    /// Runs `f` with a fresh container bound to `registry` and closes it
    /// on the way out, including when `f` panics.
    pub fn scope<R>(registry: &Arc<Registry>, f: impl FnOnce(&Container) -> R) -> R {
        struct CloseGuard(Container);
        impl Drop for CloseGuard {
            fn drop(&mut self) {
                self.0.close();
            }
        }

        let guard = CloseGuard(Container::new(Arc::clone(registry)));
        f(&guard.0)
    }

    /// Async variant of [`Container::scope`]; closes with
    /// [`Container::aclose`] after `f`'s future resolves.
    pub async fn ascope<R>(
        registry: &Arc<Registry>,
        f: impl for<'a> FnOnce(&'a Container) -> BoxFuture<'a, R>,
    ) -> R {
        let container = Container::new(Arc::clone(registry));
        let rv = f(&container).await;
        container.aclose().await;
        rv
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Container")
            .field("instantiated", &state.cache.len())
            .field("cleanups", &state.cleanups.len())
            .finish()
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        if !self.state.get_mut().cleanups.is_empty() {
            warn!("container dropped with pending cleanups");
        }
    }
}

// ═══════════════════════════════════════════
// Prelude
// ═══════════════════════════════════════════

pub mod prelude {
    pub use super::Container;
    pub use crate::cleanup::{
        AsyncScopedResource, Instance, Produced, ScopedResource,
    };
    pub use crate::error::{BoxError, KhidmaError, Result};
    pub use crate::key::ServiceKey;
    pub use crate::ping::ServicePing;
    pub use crate::record::Registration;
    pub use crate::registry::Registry;
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════
