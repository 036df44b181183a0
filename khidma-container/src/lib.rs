//! Core registry/container implementation for Khidma.

pub mod cleanup;
pub mod container;
pub mod error;
pub mod key;
pub mod ping;
pub mod record;
pub mod registry;

pub use cleanup::{AsyncScopedResource, Instance, Produced, ScopedResource};
pub use container::{Container, prelude};
pub use error::{BoxError, KhidmaError, Result};
pub use key::ServiceKey;
pub use ping::ServicePing;
pub use record::Registration;
pub use registry::Registry;
