use std::any::Any;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type Service = Arc<dyn Any + Send + Sync + 'static>;

/// A read-only registry of shared services, keyed by type.
///
/// The registry is filled by the caller before execution and shared by every
/// resolution of a request. Service lifetimes stay with the caller: the
/// registry only holds `Arc` handles.
///
/// ```ignore
/// let services = ServiceRegistry::new().with(Database::connect());
/// let db = services.get::<Database>().unwrap();
/// ```
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    services: Arc<HashMap<TypeId, (Service, &'static str)>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service, replacing any service of the same type.
    pub fn with<T: Send + Sync + 'static>(self, service: T) -> Self {
        self.with_arc(Arc::new(service))
    }

    /// Registers an already shared service.
    pub fn with_arc<T: Send + Sync + 'static>(self, service: Arc<T>) -> Self {
        let mut services = Arc::unwrap_or_clone(self.services);
        services.insert(
            TypeId::of::<T>(),
            (service as Service, std::any::type_name::<T>()),
        );
        Self {
            services: Arc::new(services),
        }
    }

    /// Gets a service by type.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.services
            .get(&TypeId::of::<T>())
            .and_then(|(service, _)| service.clone().downcast::<T>().ok())
    }

    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.contains_id(TypeId::of::<T>())
    }

    pub(crate) fn contains_id(&self, type_id: TypeId) -> bool {
        self.services.contains_key(&type_id)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.services.values().map(|(_, name)| name))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Greeter(&'static str);

    #[test]
    fn get_by_type() {
        let registry = ServiceRegistry::new().with(Greeter("hello")).with(42u32);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get::<Greeter>().as_deref(), Some(&Greeter("hello")));
        assert_eq!(registry.get::<u32>().as_deref(), Some(&42));
        assert!(registry.get::<String>().is_none());
        assert!(registry.contains::<Greeter>());
        assert!(!registry.contains::<u64>());
    }

    #[test]
    fn later_registration_replaces() {
        let shared = Arc::new(Greeter("shared"));
        let registry = ServiceRegistry::new()
            .with(Greeter("first"))
            .with_arc(shared.clone());

        assert!(Arc::ptr_eq(&registry.get::<Greeter>().unwrap(), &shared));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn clones_share_services() {
        let registry = ServiceRegistry::new().with(Greeter("hello"));
        let clone = registry.clone();
        assert!(Arc::ptr_eq(
            &registry.get::<Greeter>().unwrap(),
            &clone.get::<Greeter>().unwrap()
        ));
        assert!(format!("{registry:?}").contains("Greeter"));
    }
}
