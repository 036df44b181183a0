//! Service identification keys.
//!
//! [`ServiceKey`] uniquely identifies a service within a registry.
//! It combines a [`TypeId`] with an optional name so that several
//! services of the same shape can be registered side by side.

use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Uniquely identifies a service in a registry or container.
///
/// Each service is identified by its Rust type ([`TypeId`]) and an
/// optional name for cases where multiple instances of the same type
/// are needed (say, a primary and a replica database connection).
///
/// The key is purely a lookup token; nothing checks at runtime that the
/// instance produced for a key actually matches the declared type beyond
/// the downcast performed on retrieval.
///
/// # Examples
/// ```
/// use khidma_container::key::ServiceKey;
///
/// // Simple key — just a type
/// let key = ServiceKey::of::<String>();
/// assert_eq!(key.name(), None);
///
/// // Named key — type + name
/// let key = ServiceKey::named::<String>("database_url");
/// assert_eq!(key.name(), Some("database_url"));
/// ```
#[derive(Clone)]
pub struct ServiceKey {
    type_id: TypeId,
    type_name: &'static str,
    name: Option<&'static str>,
}

impl ServiceKey {
    /// Creates a key for type `T`.
    ///
    /// # Examples
    /// ```
    /// use khidma_container::key::ServiceKey;
    ///
    /// let key = ServiceKey::of::<i32>();
    /// ```
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            name: None,
        }
    }

    /// Creates a named key for type `T`.
    ///
    /// Named keys allow registering multiple services of the same type.
    ///
    /// # Examples
    /// ```
    /// use khidma_container::key::ServiceKey;
    ///
    /// let primary = ServiceKey::named::<String>("primary_db");
    /// let replica = ServiceKey::named::<String>("replica_db");
    /// assert_ne!(primary, replica);
    /// ```
    #[inline]
    pub fn named<T: ?Sized + 'static>(name: &'static str) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            name: Some(name),
        }
    }

    /// Returns the [`TypeId`] of this service.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the human-readable type name.
    ///
    /// Used in error messages and health-check reports.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns the optional name for named registrations.
    #[inline]
    pub fn name(&self) -> Option<&'static str> {
        self.name
    }
}

// Two keys are equal iff TypeId and name both match.
impl PartialEq for ServiceKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.name == other.name
    }
}

impl Eq for ServiceKey {}

impl Hash for ServiceKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
        self.name.hash(state);
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name {
            Some(name) => write!(f, "ServiceKey({}, name={:?})", self.type_name, name),
            None => write!(f, "ServiceKey({})", self.type_name),
        }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name {
            Some(name) => write!(f, "{} (name={:?})", self.type_name, name),
            None => write!(f, "{}", self.type_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MyService;

    #[test]
    fn key_of_type() {
        let key = ServiceKey::of::<MyService>();
        assert!(key.type_name().contains("MyService"));
        assert_eq!(key.name(), None);
    }

    #[test]
    fn key_equality_same_type() {
        assert_eq!(ServiceKey::of::<String>(), ServiceKey::of::<String>());
    }

    #[test]
    fn key_inequality_different_types() {
        assert_ne!(ServiceKey::of::<String>(), ServiceKey::of::<i32>());
    }

    #[test]
    fn named_keys_different() {
        let k1 = ServiceKey::named::<String>("a");
        let k2 = ServiceKey::named::<String>("b");
        assert_ne!(k1, k2);
    }

    #[test]
    fn named_vs_unnamed_different() {
        assert_ne!(
            ServiceKey::named::<String>("a"),
            ServiceKey::of::<String>()
        );
    }

    #[test]
    fn key_in_hashmap() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(ServiceKey::of::<String>(), "string");
        map.insert(ServiceKey::of::<i32>(), "i32");
        assert_eq!(map.get(&ServiceKey::of::<String>()), Some(&"string"));
        assert_eq!(map.get(&ServiceKey::of::<bool>()), None);
    }

    #[test]
    fn unsized_type_key() {
        // dyn traits work as keys
        trait MyTrait {}
        let _key = ServiceKey::of::<dyn MyTrait>();
    }
}
