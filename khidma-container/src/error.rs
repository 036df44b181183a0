//! Error types for Khidma container operations.
//!
//! Resolution failures carry "did you mean?" suggestions so a typo'd
//! or forgotten registration is immediately actionable.

use crate::key::ServiceKey;
use std::fmt;

/// Boxed error returned by factories, cleanups, hooks, and pings.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for all Khidma operations.
#[derive(Debug, thiserror::Error)]
pub enum KhidmaError {
    /// Requested service was never registered.
    #[error("{}", .0)]
    NotFound(ServiceNotFoundError),

    /// A synchronous call path hit a service that needs asynchronous
    /// execution (async factory, async resource, or async ping).
    #[error("cannot instantiate async service {key} synchronously; use `aget()`")]
    AsyncRequired { key: ServiceKey },

    /// Factory (or resource entry) returned an error during instantiation.
    #[error("failed to construct {key}: {source}")]
    ConstructionFailed {
        key: ServiceKey,
        #[source]
        source: BoxError,
    },

    /// A cached instance could not be downcast to the requested type.
    #[error("type mismatch for {key}: expected {expected}")]
    TypeMismatch {
        key: ServiceKey,
        expected: &'static str,
    },

    /// A health-check callable reported a failure.
    #[error("ping for {key} failed: {source}")]
    PingFailed {
        key: ServiceKey,
        #[source]
        source: BoxError,
    },
}

/// Error when a service was not registered.
///
/// Includes helpful hints about what went wrong.
#[derive(Debug)]
pub struct ServiceNotFoundError {
    /// The service that was requested
    pub requested: ServiceKey,
    /// Similar keys that ARE registered (for "did you mean?" suggestions)
    pub suggestions: Vec<ServiceKey>,
}

impl fmt::Display for ServiceNotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Service not registered: {}", self.requested)?;

        if !self.suggestions.is_empty() {
            write!(f, "\n  Did you mean one of:")?;
            for suggestion in &self.suggestions {
                write!(f, "\n    - {suggestion}")?;
            }
        }

        write!(
            f,
            "\n  Hint: Did you forget to call register_factory::<{}>()?",
            self.requested.type_name()
        )
    }
}

/// Convenient Result type for Khidma operations.
pub type Result<T> = std::result::Result<T, KhidmaError>;
