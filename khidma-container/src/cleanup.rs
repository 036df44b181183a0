//! Instance normalization and cleanup machinery.
//!
//! Factories do not return bare values; they return a [`Produced`], a
//! tagged variant that says up front whether the result carries cleanup
//! obligations. [`adapt`]/[`aadapt`] turn a `Produced` into the cached
//! instance plus an optional [`CleanupEntry`] in one place, so call
//! sites never probe capabilities ad hoc.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::error::{BoxError, KhidmaError};
use crate::key::ServiceKey;

/// Shared handle to a produced service instance.
///
/// Typed retrieval downcasts this to `Arc<T>`; repeated lookups hand out
/// clones of the same `Arc`, which is what makes the one-instance-per-key
/// guarantee observable via pointer identity.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// One-shot synchronous release closure.
pub type CleanupFn = Box<dyn FnOnce() -> std::result::Result<(), BoxError> + Send>;

/// One-shot asynchronous release closure.
pub type AsyncCleanupFn =
    Box<dyn FnOnce() -> BoxFuture<'static, std::result::Result<(), BoxError>> + Send>;

/// Object-safe bridge back to `dyn Any`, blanket-implemented for every
/// candidate resource type. Satisfied automatically; not part of the
/// surface you implement.
#[doc(hidden)]
pub trait IntoInstanceBox {
    fn into_instance_box(self: Box<Self>) -> Box<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> IntoInstanceBox for T {
    fn into_instance_box(self: Box<Self>) -> Box<dyn Any + Send + Sync> {
        self
    }
}

/// A resource with explicit enter/exit semantics.
///
/// `enter` is called at most once, when the owning container
/// instantiates the service; `exit` is called exactly once per
/// successful `enter`, when the container closes.
pub trait ScopedResource: Any + Send + Sync + IntoInstanceBox {
    /// Acquire the resource and hand back the instance to cache.
    fn enter(&mut self) -> std::result::Result<Instance, BoxError>;

    /// Release the resource.
    fn exit(&mut self) -> std::result::Result<(), BoxError>;
}

/// Asynchronous twin of [`ScopedResource`].
#[async_trait]
pub trait AsyncScopedResource: Any + Send + Sync + IntoInstanceBox {
    /// Acquire the resource and hand back the instance to cache.
    async fn enter(&mut self) -> std::result::Result<Instance, BoxError>;

    /// Release the resource.
    async fn exit(&mut self) -> std::result::Result<(), BoxError>;
}

/// What a factory produced, tagged by its cleanup shape.
///
/// A synchronous `get()` refuses the `Async*` variants with
/// [`KhidmaError::AsyncRequired`]; `aget()` accepts all five.
pub enum Produced {
    /// A value with no cleanup obligation.
    Plain(Instance),
    /// A resource that must be entered to yield the instance and exited
    /// on container close.
    Scoped(Box<dyn ScopedResource>),
    /// An already-produced value plus a release closure that runs
    /// exactly once on container close.
    OneShot(Instance, CleanupFn),
    /// Async variant of `Scoped`.
    AsyncScoped(Box<dyn AsyncScopedResource>),
    /// Async variant of `OneShot`.
    AsyncOneShot(Instance, AsyncCleanupFn),
}

impl Produced {
    /// A plain value; ownership moves into the container's cache.
    pub fn plain<T: Send + Sync + 'static>(value: T) -> Self {
        Self::Plain(Arc::new(value))
    }

    /// A value plus a synchronous release closure.
    pub fn one_shot<T, F>(value: T, release: F) -> Self
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> std::result::Result<(), BoxError> + Send + 'static,
    {
        Self::OneShot(Arc::new(value), Box::new(release))
    }

    /// A value plus an asynchronous release closure.
    pub fn one_shot_async<T, F, Fut>(value: T, release: F) -> Self
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
    {
        Self::AsyncOneShot(
            Arc::new(value),
            Box::new(move || -> BoxFuture<'static, std::result::Result<(), BoxError>> {
                Box::pin(release())
            }),
        )
    }

    /// A resource with enter/exit semantics.
    pub fn scoped<R: ScopedResource>(resource: R) -> Self {
        Self::Scoped(Box::new(resource))
    }

    /// A resource with asynchronous enter/exit semantics.
    pub fn async_scoped<R: AsyncScopedResource>(resource: R) -> Self {
        Self::AsyncScoped(Box::new(resource))
    }
}

pub(crate) enum ReleaseFn {
    Scoped(Box<dyn ScopedResource>),
    OneShot(CleanupFn),
    AsyncScoped(Box<dyn AsyncScopedResource>),
    AsyncOneShot(AsyncCleanupFn),
}

/// One pending release, recorded in acquisition order on the container's
/// cleanup stack and fired in reverse order on close.
pub(crate) struct CleanupEntry {
    pub(crate) key: ServiceKey,
    pub(crate) release: ReleaseFn,
}

impl std::fmt::Debug for CleanupEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.release {
            ReleaseFn::Scoped(_) => "Scoped",
            ReleaseFn::OneShot(_) => "OneShot",
            ReleaseFn::AsyncScoped(_) => "AsyncScoped",
            ReleaseFn::AsyncOneShot(_) => "AsyncOneShot",
        };
        f.debug_struct("CleanupEntry")
            .field("key", &self.key)
            .field("release", &kind)
            .finish()
    }
}

impl CleanupEntry {
    pub(crate) fn is_async(&self) -> bool {
        matches!(
            self.release,
            ReleaseFn::AsyncScoped(_) | ReleaseFn::AsyncOneShot(_)
        )
    }

    /// Synchronous release. Callers filter async entries out via
    /// [`CleanupEntry::is_async`] first; an async entry is a no-op here.
    pub(crate) fn release(self) -> std::result::Result<(), BoxError> {
        match self.release {
            ReleaseFn::Scoped(mut resource) => resource.exit(),
            ReleaseFn::OneShot(finish) => finish(),
            ReleaseFn::AsyncScoped(_) | ReleaseFn::AsyncOneShot(_) => Ok(()),
        }
    }

    /// Release with whichever mode the entry requires.
    pub(crate) async fn arelease(self) -> std::result::Result<(), BoxError> {
        match self.release {
            ReleaseFn::Scoped(mut resource) => resource.exit(),
            ReleaseFn::OneShot(finish) => finish(),
            ReleaseFn::AsyncScoped(mut resource) => resource.exit().await,
            ReleaseFn::AsyncOneShot(finish) => finish().await,
        }
    }
}

/// Normalize a factory result on the synchronous path.
///
/// Returns the instance to cache plus the cleanup to record. `Async*`
/// variants cannot be handled here and surface as `AsyncRequired`.
pub(crate) fn adapt(
    key: &ServiceKey,
    produced: Produced,
    auto_enter: bool,
) -> crate::error::Result<(Instance, Option<CleanupEntry>)> {
    match produced {
        Produced::Plain(instance) => Ok((instance, None)),
        Produced::Scoped(mut resource) => {
            if auto_enter {
                let instance = resource.enter().map_err(|source| {
                    KhidmaError::ConstructionFailed {
                        key: key.clone(),
                        source,
                    }
                })?;
                let entry = CleanupEntry {
                    key: key.clone(),
                    release: ReleaseFn::Scoped(resource),
                };
                Ok((instance, Some(entry)))
            } else {
                // Not entered: the resource itself is the instance and the
                // caller owns its lifecycle.
                Ok((Arc::from(resource.into_instance_box()), None))
            }
        }
        Produced::OneShot(instance, finish) => {
            let entry = CleanupEntry {
                key: key.clone(),
                release: ReleaseFn::OneShot(finish),
            };
            Ok((instance, Some(entry)))
        }
        Produced::AsyncScoped(_) | Produced::AsyncOneShot(..) => {
            Err(KhidmaError::AsyncRequired { key: key.clone() })
        }
    }
}

/// Normalize a factory result on the asynchronous path.
///
/// Synchronous shapes are handled exactly as in [`adapt`]; a sync scoped
/// resource stays sync, it is not converted.
pub(crate) async fn aadapt(
    key: &ServiceKey,
    produced: Produced,
    auto_enter: bool,
) -> crate::error::Result<(Instance, Option<CleanupEntry>)> {
    match produced {
        Produced::AsyncScoped(mut resource) => {
            if auto_enter {
                let instance = resource.enter().await.map_err(|source| {
                    KhidmaError::ConstructionFailed {
                        key: key.clone(),
                        source,
                    }
                })?;
                let entry = CleanupEntry {
                    key: key.clone(),
                    release: ReleaseFn::AsyncScoped(resource),
                };
                Ok((instance, Some(entry)))
            } else {
                Ok((Arc::from(resource.into_instance_box()), None))
            }
        }
        Produced::AsyncOneShot(instance, finish) => {
            let entry = CleanupEntry {
                key: key.clone(),
                release: ReleaseFn::AsyncOneShot(finish),
            };
            Ok((instance, Some(entry)))
        }
        other => adapt(key, other, auto_enter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeConn {
        entered: Arc<AtomicBool>,
        exited: Arc<AtomicBool>,
    }

    impl ScopedResource for FakeConn {
        fn enter(&mut self) -> std::result::Result<Instance, BoxError> {
            self.entered.store(true, Ordering::SeqCst);
            Ok(Arc::new(String::from("connected")))
        }

        fn exit(&mut self) -> std::result::Result<(), BoxError> {
            self.exited.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn plain_has_no_cleanup() {
        let key = ServiceKey::of::<i32>();
        let (instance, cleanup) = adapt(&key, Produced::plain(42_i32), true).unwrap();

        assert_eq!(*instance.downcast::<i32>().unwrap(), 42);
        assert!(cleanup.is_none());
    }

    #[test]
    fn scoped_is_entered_and_exit_recorded() {
        let entered = Arc::new(AtomicBool::new(false));
        let exited = Arc::new(AtomicBool::new(false));
        let conn = FakeConn {
            entered: entered.clone(),
            exited: exited.clone(),
        };

        let key = ServiceKey::of::<String>();
        let (instance, cleanup) = adapt(&key, Produced::scoped(conn), true).unwrap();

        assert_eq!(*instance.downcast::<String>().unwrap(), "connected");
        assert!(entered.load(Ordering::SeqCst));
        assert!(!exited.load(Ordering::SeqCst));

        cleanup.unwrap().release().unwrap();
        assert!(exited.load(Ordering::SeqCst));
    }

    #[test]
    fn scoped_without_auto_enter_caches_the_resource_itself() {
        let entered = Arc::new(AtomicBool::new(false));
        let conn = FakeConn {
            entered: entered.clone(),
            exited: Arc::new(AtomicBool::new(false)),
        };

        let key = ServiceKey::of::<FakeConn>();
        let (instance, cleanup) = adapt(&key, Produced::scoped(conn), false).unwrap();

        assert!(!entered.load(Ordering::SeqCst));
        assert!(cleanup.is_none());
        assert!(instance.downcast::<FakeConn>().is_ok());
    }

    #[test]
    fn one_shot_records_release() {
        let released = Arc::new(AtomicBool::new(false));
        let key = ServiceKey::of::<i32>();

        let produced = Produced::one_shot(42_i32, {
            let released = released.clone();
            move || {
                released.store(true, Ordering::SeqCst);
                Ok(())
            }
        });

        let (instance, cleanup) = adapt(&key, produced, true).unwrap();
        assert_eq!(*instance.downcast::<i32>().unwrap(), 42);

        cleanup.unwrap().release().unwrap();
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn sync_path_rejects_async_shapes() {
        let key = ServiceKey::of::<i32>();
        let produced = Produced::one_shot_async(42_i32, || async { Ok(()) });

        let err = adapt(&key, produced, true).unwrap_err();
        assert!(matches!(err, KhidmaError::AsyncRequired { .. }));
    }

    #[tokio::test]
    async fn async_path_handles_sync_shapes() {
        let key = ServiceKey::of::<i32>();
        let (instance, cleanup) = aadapt(&key, Produced::plain(7_i32), true).await.unwrap();

        assert_eq!(*instance.downcast::<i32>().unwrap(), 7);
        assert!(cleanup.is_none());
    }

    #[tokio::test]
    async fn async_one_shot_releases_on_arelease() {
        let released = Arc::new(AtomicBool::new(false));
        let key = ServiceKey::of::<i32>();

        let produced = Produced::one_shot_async(42_i32, {
            let released = released.clone();
            move || async move {
                released.store(true, Ordering::SeqCst);
                Ok(())
            }
        });

        let (_, cleanup) = aadapt(&key, produced, true).await.unwrap();
        let entry = cleanup.unwrap();
        assert!(entry.is_async());

        entry.arelease().await.unwrap();
        assert!(released.load(Ordering::SeqCst));
    }
}
