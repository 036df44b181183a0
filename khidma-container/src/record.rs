//! Registration records — the stored recipe for one service.
//!
//! A [`Registration`] is built by the caller and handed to
//! [`Registry::register`](crate::registry::Registry::register); the
//! registry freezes it into an internal record that is never mutated
//! afterwards. Re-registering a key replaces the record wholesale.

use std::any::type_name;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::cleanup::{Instance, Produced};
use crate::container::Container;
use crate::error::BoxError;

/// Synchronous factory function.
///
/// Factories always receive the resolving [`Container`] so they can pull
/// their own dependencies from it; ignore the argument if you don't need
/// it.
///
/// # Why `Arc` and not `Box`?
/// Records are shared between many containers (the registry is read from
/// every request). `Arc` allows cloning without copying the closure.
pub type FactoryFn =
    Arc<dyn Fn(&Container) -> std::result::Result<Produced, BoxError> + Send + Sync>;

/// Asynchronous factory function.
///
/// The returned future may borrow the container, so self-referential
/// service graphs work on the async path too:
/// `|c| Box::pin(async move { c.aget::<Db>().await?; .. })`.
pub type AsyncFactoryFn = Arc<
    dyn for<'a> Fn(&'a Container) -> BoxFuture<'a, std::result::Result<Produced, BoxError>>
        + Send
        + Sync,
>;

pub(crate) enum ServiceSource {
    Factory(FactoryFn),
    AsyncFactory(AsyncFactoryFn),
    Value(Instance),
}

#[derive(Clone)]
pub(crate) enum PingFn {
    Sync(Arc<dyn Fn(Instance) -> std::result::Result<(), BoxError> + Send + Sync>),
    Async(
        Arc<
            dyn Fn(Instance) -> BoxFuture<'static, std::result::Result<(), BoxError>>
                + Send
                + Sync,
        >,
    ),
}

pub(crate) enum HookFn {
    Sync(Box<dyn FnOnce() -> std::result::Result<(), BoxError> + Send>),
    Async(Box<dyn FnOnce() -> BoxFuture<'static, std::result::Result<(), BoxError>> + Send>),
}

/// Frozen registration metadata for one service key.
pub(crate) struct Record {
    pub(crate) source: ServiceSource,
    pub(crate) auto_enter: bool,
    pub(crate) ping: Option<PingFn>,
}

impl Record {
    /// Whether instantiating this service requires `aget()`.
    ///
    /// Fixed at registration time; call sites never probe per call.
    pub(crate) fn is_async(&self) -> bool {
        matches!(self.source, ServiceSource::AsyncFactory(_))
    }
}

/// Builder for one service registration.
///
/// Start from [`Registration::factory`], [`Registration::async_factory`],
/// or [`Registration::value`], then chain the optional pieces.
///
/// # Examples
/// ```
/// use khidma_container::prelude::*;
///
/// let registry = Registry::new();
/// registry.register(
///     ServiceKey::of::<String>(),
///     Registration::factory(|_| Ok(Produced::plain(String::from("built"))))
///         .ping(|_s: &String| Ok(())),
/// );
/// registry.close();
/// ```
pub struct Registration {
    pub(crate) source: ServiceSource,
    pub(crate) auto_enter: bool,
    pub(crate) ping: Option<PingFn>,
    pub(crate) on_close: Option<HookFn>,
}

impl Registration {
    /// A synchronous factory. Results are auto-entered by default.
    pub fn factory(
        factory: impl Fn(&Container) -> std::result::Result<Produced, BoxError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            source: ServiceSource::Factory(Arc::new(factory)),
            auto_enter: true,
            ping: None,
            on_close: None,
        }
    }

    /// An asynchronous factory. Results are auto-entered by default.
    pub fn async_factory(
        factory: impl for<'a> Fn(&'a Container) -> BoxFuture<'a, std::result::Result<Produced, BoxError>>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            source: ServiceSource::AsyncFactory(Arc::new(factory)),
            auto_enter: true,
            ping: None,
            on_close: None,
        }
    }

    /// A precomputed value.
    ///
    /// Unlike factories, values are never treated as scoped resources, so
    /// `auto_enter` defaults to `false`.
    pub fn value<V: Send + Sync + 'static>(value: V) -> Self {
        Self {
            source: ServiceSource::Value(Arc::new(value)),
            auto_enter: false,
            ping: None,
            on_close: None,
        }
    }

    /// Whether scoped-resource results are entered on instantiation.
    pub fn auto_enter(mut self, auto_enter: bool) -> Self {
        self.auto_enter = auto_enter;
        self
    }

    /// Attach a synchronous health check.
    ///
    /// The callable receives the acquired instance; see
    /// [`Container::get_pings`](crate::container::Container::get_pings).
    pub fn ping<T>(
        mut self,
        ping: impl Fn(&T) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self
    where
        T: Send + Sync + 'static,
    {
        self.ping = Some(PingFn::Sync(Arc::new(move |instance: Instance| {
            let svc = instance.downcast_ref::<T>().ok_or_else(|| -> BoxError {
                format!("ping target is not a {}", type_name::<T>()).into()
            })?;
            ping(svc)
        })));
        self
    }

    /// Attach an asynchronous health check.
    pub fn ping_async<T, F, Fut>(mut self, ping: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
    {
        self.ping = Some(PingFn::Async(Arc::new(
            move |instance: Instance| -> BoxFuture<'static, std::result::Result<(), BoxError>> {
                match instance.downcast::<T>() {
                    Ok(svc) => Box::pin(ping(svc)),
                    Err(_) => {
                        let error: BoxError =
                            format!("ping target is not a {}", type_name::<T>()).into();
                        Box::pin(async move { Err(error) })
                    }
                }
            },
        )));
        self
    }

    /// Run `hook` when the owning registry is closed.
    ///
    /// Hooks survive re-registration of the key: overwriting a record
    /// does not forget its hook.
    pub fn on_close(
        mut self,
        hook: impl FnOnce() -> std::result::Result<(), BoxError> + Send + 'static,
    ) -> Self {
        self.on_close = Some(HookFn::Sync(Box::new(hook)));
        self
    }

    /// Async variant of [`Registration::on_close`]; requires
    /// [`Registry::aclose`](crate::registry::Registry::aclose).
    pub fn on_close_async<F, Fut>(mut self, hook: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
    {
        self.on_close = Some(HookFn::Async(Box::new(
            move || -> BoxFuture<'static, std::result::Result<(), BoxError>> {
                Box::pin(hook())
            },
        )));
        self
    }

    pub(crate) fn into_parts(self) -> (Record, Option<HookFn>) {
        let Registration {
            source,
            auto_enter,
            ping,
            on_close,
        } = self;
        (
            Record {
                source,
                auto_enter,
                ping,
            },
            on_close,
        )
    }
}
