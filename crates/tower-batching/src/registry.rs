//! An explicit, typed service registry.
//!
//! Composition code that should not know which resolver backs a service can
//! look the service up here instead of reaching for a global. A registry is
//! an ordinary value: build it at startup and pass it (or an `Arc` of it)
//! to whatever needs it.

use crate::error::RegistryError;
use hashbrown::HashMap;
use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// A map from type to a shared instance of that type.
///
/// Unsized types are supported, so a trait object can be registered and
/// looked up by its trait:
///
/// ```
/// use std::sync::Arc;
/// use tower_batching::Registry;
///
/// trait Greeter: Send + Sync {
///     fn greet(&self) -> String;
/// }
///
/// struct English;
///
/// impl Greeter for English {
///     fn greet(&self) -> String {
///         "hello".to_string()
///     }
/// }
///
/// let registry = Registry::new().with::<dyn Greeter>(Arc::new(English));
/// let greeter = registry.lookup::<dyn Greeter>().unwrap();
/// assert_eq!(greeter.greet(), "hello");
/// ```
#[derive(Default, Clone)]
pub struct Registry {
    services: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    names: HashMap<TypeId, &'static str>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `service` under `T`, replacing any previous registration.
    pub fn register<T>(&mut self, service: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let id = TypeId::of::<T>();
        self.services.insert(id, Arc::new(service));
        self.names.insert(id, type_name::<T>());
    }

    /// Builder-style [`register`](Registry::register).
    pub fn with<T>(mut self, service: Arc<T>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.register(service);
        self
    }

    /// Looks up the service registered under `T`.
    pub fn lookup<T>(&self) -> Result<Arc<T>, RegistryError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.services
            .get(&TypeId::of::<T>())
            .and_then(|service| service.downcast_ref::<Arc<T>>())
            .cloned()
            .ok_or(RegistryError::Missing {
                type_name: type_name::<T>(),
            })
    }

    /// Returns true if a service is registered under `T`.
    pub fn contains<T>(&self) -> bool
    where
        T: ?Sized + 'static,
    {
        self.services.contains_key(&TypeId::of::<T>())
    }

    /// Number of registered services.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.names.values().copied().collect();
        names.sort_unstable();
        f.debug_struct("Registry").field("services", &names).finish()
    }
}
