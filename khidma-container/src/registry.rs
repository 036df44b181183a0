//! Service registry — the application-scoped store of registrations.
//!
//! The registry maps [`ServiceKey`] to records that know how to create
//! instances. One registry should live as long as the application does;
//! it is read from many concurrent containers and written rarely
//! (usually only at startup), which is why records live in a [`DashMap`].

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::cleanup::Produced;
use crate::container::Container;
use crate::error::BoxError;
use crate::key::ServiceKey;
use crate::record::{HookFn, Record, Registration};

/// Stores all service registrations plus the on-close hooks.
///
/// Repeated registrations for a key silently replace the previous record,
/// but on-close hooks accumulate: closing the registry runs every hook
/// ever registered, in registration order, even for overwritten records.
///
/// Closing is idempotent. A registry dropped with pending hooks logs a
/// warning; correctness must never rely on `Drop`.
pub struct Registry {
    records: DashMap<ServiceKey, Arc<Record>>,
    on_close: Mutex<Vec<(ServiceKey, HookFn)>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            on_close: Mutex::new(Vec::new()),
        }
    }

    /// Registers `registration` under `key`, replacing any prior record.
    pub fn register(&self, key: ServiceKey, registration: Registration) {
        let (record, hook) = registration.into_parts();
        debug!(key = %key, is_async = record.is_async(), "registered service");
        self.records.insert(key.clone(), Arc::new(record));
        if let Some(hook) = hook {
            self.on_close.lock().push((key, hook));
        }
    }

    /// Registers a synchronous factory for `T` with default settings.
    ///
    /// Use [`Registry::register`] with a [`Registration`] to attach a
    /// ping, an on-close hook, or a named key.
    pub fn register_factory<T: Send + Sync + 'static>(
        &self,
        factory: impl Fn(&Container) -> std::result::Result<Produced, BoxError>
            + Send
            + Sync
            + 'static,
    ) {
        self.register(ServiceKey::of::<T>(), Registration::factory(factory));
    }

    /// Registers an asynchronous factory for `T` with default settings.
    pub fn register_async_factory<T: Send + Sync + 'static>(
        &self,
        factory: impl for<'a> Fn(&'a Container) -> BoxFuture<'a, std::result::Result<Produced, BoxError>>
            + Send
            + Sync
            + 'static,
    ) {
        self.register(ServiceKey::of::<T>(), Registration::async_factory(factory));
    }

    /// Registers a precomputed value for `T`.
    pub fn register_value<T: Send + Sync + 'static>(&self, value: T) {
        self.register(ServiceKey::of::<T>(), Registration::value(value));
    }

    /// Membership test without instantiation.
    ///
    /// # Examples
    /// ```
    /// use khidma_container::prelude::*;
    ///
    /// let registry = Registry::new();
    /// registry.register_value(42_i32);
    /// assert!(registry.contains_type::<i32>());
    /// assert!(!registry.contains_type::<String>());
    /// ```
    pub fn contains(&self, key: &ServiceKey) -> bool {
        self.records.contains_key(key)
    }

    /// Like [`Registry::contains`], keyed by type.
    pub fn contains_type<T: ?Sized + 'static>(&self) -> bool {
        self.contains(&ServiceKey::of::<T>())
    }

    /// Snapshot of the currently registered keys.
    ///
    /// Registrations racing with this call may or may not be included;
    /// the snapshot itself is stable once taken.
    pub fn iterate(&self) -> Vec<ServiceKey> {
        self.records.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Returns the number of registered services.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no services are registered.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn lookup(&self, key: &ServiceKey) -> Option<Arc<Record>> {
        self.records.get(key).map(|entry| Arc::clone(entry.value()))
    }

    pub(crate) fn snapshot_records(&self) -> Vec<(ServiceKey, Arc<Record>)> {
        self.records
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    /// Clears registrations and runs the synchronous on-close hooks in
    /// registration order.
    ///
    /// Async hooks are *not* awaited; they are skipped with a warning —
    /// use [`Registry::aclose`] instead. Hook failures are logged at
    /// warning level and do not stop the remaining hooks. Idempotent.
    pub fn close(&self) {
        let hooks = std::mem::take(&mut *self.on_close.lock());
        for (key, hook) in hooks {
            match hook {
                HookFn::Sync(hook) => {
                    debug!(key = %key, "running on-close hook");
                    if let Err(error) = hook() {
                        warn!(key = %key, %error, "on-close hook failed");
                    }
                }
                HookFn::Async(_) => {
                    warn!(key = %key, "skipped async on-close hook; use `aclose()`");
                }
            }
        }
        self.records.clear();
    }

    /// Clears registrations and runs *all* on-close hooks, sync and
    /// async, in registration order.
    ///
    /// Hook failures are logged at warning level and do not stop the
    /// remaining hooks. Idempotent.
    pub async fn aclose(&self) {
        let hooks = std::mem::take(&mut *self.on_close.lock());
        for (key, hook) in hooks {
            debug!(key = %key, "running on-close hook");
            let result = match hook {
                HookFn::Sync(hook) => hook(),
                HookFn::Async(hook) => hook().await,
            };
            if let Err(error) = result {
                warn!(key = %key, %error, "on-close hook failed");
            }
        }
        self.records.clear();
    }

    /// Runs `f` against a fresh registry and closes it on the way out,
    /// including when `f` panics.
    pub fn scope<R>(f: impl FnOnce(&Registry) -> R) -> R {
        struct CloseGuard<'a>(&'a Registry);
        impl Drop for CloseGuard<'_> {
            fn drop(&mut self) {
                self.0.close();
            }
        }

        let registry = Registry::new();
        let guard = CloseGuard(&registry);
        f(guard.0)
    }

    /// Async variant of [`Registry::scope`]; closes with
    /// [`Registry::aclose`] after `f`'s future resolves.
    pub async fn ascope<R>(f: impl for<'a> FnOnce(&'a Registry) -> BoxFuture<'a, R>) -> R {
        let registry = Registry::new();
        let rv = f(&registry).await;
        registry.aclose().await;
        rv
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("registered", &self.records.len())
            .finish()
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        if !self.on_close.get_mut().is_empty() {
            warn!("registry dropped with pending on-close hooks");
        }
    }
}
