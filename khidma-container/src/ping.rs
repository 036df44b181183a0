//! Health checks for registered services.
//!
//! A [`ServicePing`] is a handle that lazily acquires its service
//! through the container — caching it and recording its cleanup exactly
//! like a regular lookup — and then invokes the registration's ping
//! callable on the acquired instance.

use crate::container::Container;
use crate::error::{KhidmaError, Result};
use crate::key::ServiceKey;
use crate::record::{PingFn, Record};

/// A service health check as returned by
/// [`Container::get_pings`](crate::container::Container::get_pings).
///
/// Pings are independently actionable: one failing ping never affects
/// another. Each call to `get_pings` builds fresh handles; nothing is
/// persisted.
pub struct ServicePing<'c> {
    key: ServiceKey,
    ping: PingFn,
    factory_is_async: bool,
    container: &'c Container,
}

impl<'c> ServicePing<'c> {
    /// Returns `None` when the record has no ping.
    pub(crate) fn new(
        key: ServiceKey,
        record: &Record,
        container: &'c Container,
    ) -> Option<Self> {
        let ping = record.ping.as_ref()?.clone();
        Some(Self {
            key,
            ping,
            factory_is_async: record.is_async(),
            container,
        })
    }

    /// Human-readable service name, for health reports.
    pub fn name(&self) -> &'static str {
        self.key.type_name()
    }

    /// The key this ping is bound to.
    pub fn key(&self) -> &ServiceKey {
        &self.key
    }

    /// Whether this ping must go through [`ServicePing::aping`] — true
    /// if the factory or the ping callable is asynchronous.
    pub fn is_async(&self) -> bool {
        self.factory_is_async || matches!(self.ping, PingFn::Async(_))
    }

    /// Acquire the service, record its cleanup, and call its ping
    /// callable with the acquired instance.
    ///
    /// Fails with [`KhidmaError::AsyncRequired`] if the factory or the
    /// ping callable is asynchronous.
    pub fn ping(&self) -> Result<()> {
        match &self.ping {
            PingFn::Sync(ping) => {
                let instance = self.container.get_erased(&self.key)?;
                ping(instance).map_err(|source| KhidmaError::PingFailed {
                    key: self.key.clone(),
                    source,
                })
            }
            PingFn::Async(_) => Err(KhidmaError::AsyncRequired {
                key: self.key.clone(),
            }),
        }
    }

    /// Same as [`ServicePing::ping`] but acquires and/or pings
    /// asynchronously where necessary.
    ///
    /// Also works with fully synchronous services, so in an async
    /// application, just use this.
    pub async fn aping(&self) -> Result<()> {
        let instance = self.container.aget_erased(&self.key).await?;
        let result = match &self.ping {
            PingFn::Sync(ping) => ping(instance),
            PingFn::Async(ping) => ping(instance).await,
        };
        result.map_err(|source| KhidmaError::PingFailed {
            key: self.key.clone(),
            source,
        })
    }
}
