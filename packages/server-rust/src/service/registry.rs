use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::auth::AuthFunc;

// ---------------------------------------------------------------------------
// RpcService trait
// ---------------------------------------------------------------------------

/// A business service whose methods are served through the call pipeline.
///
/// The `Any` bound enables type-based lookup via `ServiceRegistry::get::<T>()`.
pub trait RpcService: Send + Sync + Any {
    /// Fully-qualified service name (e.g., `"example.v1.Greeter"`), as it
    /// appears in `/<service>/<method>`.
    fn name(&self) -> &'static str;

    /// Auth function replacing the default for every method of this service.
    fn auth_override(&self) -> Option<Arc<dyn AuthFunc>> {
        None
    }
}

// ---------------------------------------------------------------------------
// ServiceRegistry
// ---------------------------------------------------------------------------

/// Registry of the services a server exposes.
///
/// Provides two lookup mechanisms:
/// - **By name** (`get_by_name`): uses the service's `name()` string
/// - **By type** (`get::<T>`): uses `TypeId`
///
/// Auth overrides are collected from here once, when the pipeline is built.
pub struct ServiceRegistry {
    by_name: DashMap<&'static str, Arc<dyn RpcService>>,
    by_type: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    /// Registration order, without duplicates.
    order: RwLock<Vec<&'static str>>,
}

impl ServiceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_name: DashMap::new(),
            by_type: DashMap::new(),
            order: RwLock::new(Vec::new()),
        }
    }

    /// Register a service. A later registration under the same name replaces
    /// the earlier one but keeps its position in `service_names()`.
    pub fn register<T: RpcService>(&self, service: T) -> Arc<T> {
        let name = service.name();
        let arc = Arc::new(service);
        if self.by_name.insert(name, arc.clone()).is_none() {
            self.order.write().push(name);
        }
        self.by_type.insert(TypeId::of::<T>(), arc.clone());
        arc
    }

    /// Retrieve a service by its concrete type.
    pub fn get<T: RpcService>(&self) -> Option<Arc<T>> {
        self.by_type
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.value().clone().downcast::<T>().ok())
    }

    /// Retrieve a service by its name.
    pub fn get_by_name(&self, name: &str) -> Option<Arc<dyn RpcService>> {
        self.by_name.get(name).map(|entry| entry.value().clone())
    }

    /// Names of registered services, in registration order.
    pub fn service_names(&self) -> Vec<&'static str> {
        self.order.read().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Snapshot of the auth overrides declared by registered services, keyed
    /// by service name.
    pub fn auth_overrides(&self) -> HashMap<String, Arc<dyn AuthFunc>> {
        self.by_name
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .auth_override()
                    .map(|auth| ((*entry.key()).to_string(), auth))
            })
            .collect()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AllowAll;

    struct Plain {
        svc_name: &'static str,
    }

    impl RpcService for Plain {
        fn name(&self) -> &'static str {
            self.svc_name
        }
    }

    /// A distinct service type that declares an override.
    struct Open;

    impl RpcService for Open {
        fn name(&self) -> &'static str {
            "example.v1.Open"
        }

        fn auth_override(&self) -> Option<Arc<dyn AuthFunc>> {
            Some(Arc::new(AllowAll))
        }
    }

    #[test]
    fn register_and_get_by_name() {
        let registry = ServiceRegistry::new();
        registry.register(Plain { svc_name: "a" });

        let svc = registry.get_by_name("a");
        assert_eq!(svc.unwrap().name(), "a");
        assert!(registry.get_by_name("nonexistent").is_none());
    }

    #[test]
    fn register_and_get_by_type() {
        let registry = ServiceRegistry::new();
        assert!(registry.get::<Open>().is_none());
        registry.register(Open);
        assert_eq!(registry.get::<Open>().unwrap().name(), "example.v1.Open");
    }

    #[test]
    fn names_follow_registration_order() {
        let registry = ServiceRegistry::new();
        registry.register(Plain { svc_name: "first" });
        registry.register(Open);
        registry.register(Plain { svc_name: "third" });
        assert_eq!(
            registry.service_names(),
            vec!["first", "example.v1.Open", "third"]
        );
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn duplicate_name_replaces_without_reordering() {
        let registry = ServiceRegistry::new();
        registry.register(Plain { svc_name: "x" });
        registry.register(Plain { svc_name: "y" });
        registry.register(Plain { svc_name: "x" });
        assert_eq!(registry.service_names(), vec!["x", "y"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn only_declared_overrides_are_collected() {
        let registry = ServiceRegistry::new();
        registry.register(Plain { svc_name: "plain" });
        registry.register(Open);

        let overrides = registry.auth_overrides();
        assert_eq!(overrides.len(), 1);
        assert!(overrides.contains_key("example.v1.Open"));
    }
}
