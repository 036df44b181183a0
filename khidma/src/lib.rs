//! # Khidma — service registry & container for Rust server applications
//!
//! Khidma gives server applications centralized, loosely-coupled
//! management of external resources (database connections, API clients,
//! caches): register factories once at startup, pull ready-to-use
//! instances per request, and let the container run every cleanup in
//! reverse order when the request ends.
//!
//! Two pieces, two lifetimes:
//!
//! - [`Registry`] — application-scoped; stores the recipes and the
//!   registry-close hooks.
//! - [`Container`] — request-scoped; caches at most one instance per
//!   key, tracks cleanups, and resolves against the registry (with an
//!   optional container-local override registry for tests).
//!
//! # Examples
//! ```
//! use khidma::{Container, Produced, Registry};
//! use std::sync::Arc;
//!
//! struct Greeter {
//!     greeting: String,
//! }
//!
//! let registry = Arc::new(Registry::new());
//! registry.register_factory::<Greeter>(|_| {
//!     Ok(Produced::plain(Greeter {
//!         greeting: "hello".into(),
//!     }))
//! });
//!
//! let container = Container::new(Arc::clone(&registry));
//! let greeter = container.get::<Greeter>().unwrap();
//! assert_eq!(greeter.greeting, "hello");
//!
//! // Same key, same instance — the factory ran once.
//! let again = container.get::<Greeter>().unwrap();
//! assert!(Arc::ptr_eq(&greeter, &again));
//!
//! container.close();
//! registry.close();
//! ```
//!
//! Factories that own real resources return [`Produced::one_shot`] (or
//! implement [`ScopedResource`]) so the container knows how to release
//! them; health checks hang off registrations via
//! [`Registration`](khidma_container::Registration) and surface through
//! [`Container::get_pings`].

pub use khidma_container::*;
