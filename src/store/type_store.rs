//! One-instance-per-type service store

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;

use super::Disposable;
use crate::core::{DiagnosticKind, Diagnostics};
use crate::pool::BufferPools;

/// A value stored in a [`TypeStore`]
pub trait StoreService: Any + Send + Disposable {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Any + Send + Disposable> StoreService for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Holds at most one service of each type
pub struct TypeStore {
    services: HashMap<TypeId, Box<dyn StoreService>>,
    diagnostics: Diagnostics,
}

impl TypeStore {
    pub fn new(diagnostics: Diagnostics) -> Self {
        Self {
            services: HashMap::new(),
            diagnostics,
        }
    }

    pub fn get<T: StoreService>(&self) -> Option<&T> {
        self.services
            .get(&TypeId::of::<T>())
            .and_then(|s| s.as_ref().as_any().downcast_ref::<T>())
    }

    pub fn get_mut<T: StoreService>(&mut self) -> Option<&mut T> {
        self.services
            .get_mut(&TypeId::of::<T>())
            .and_then(|s| s.as_mut().as_any_mut().downcast_mut::<T>())
    }

    pub fn get_or_create<T: StoreService>(&mut self, create: impl FnOnce() -> T) -> &mut T {
        let service = self
            .services
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(create()));
        service
            .as_mut()
            .as_any_mut()
            .downcast_mut::<T>()
            .expect("type store entries are keyed by their own TypeId")
    }

    /// Insert a service. A second service of the same type is reported and dropped.
    pub fn add<T: StoreService>(&mut self, service: T) -> bool {
        let id = TypeId::of::<T>();
        if self.services.contains_key(&id) {
            self.diagnostics.report(
                DiagnosticKind::DuplicateKey,
                format!("type store already holds a {}", type_name::<T>()),
            );
            return false;
        }
        self.services.insert(id, Box::new(service));
        true
    }

    pub fn remove<T: StoreService>(&mut self) -> Option<T> {
        self.services
            .remove(&TypeId::of::<T>())
            .and_then(|s| s.into_any().downcast::<T>().ok())
            .map(|boxed| *boxed)
    }

    pub fn contains<T: StoreService>(&self) -> bool {
        self.services.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl Disposable for TypeStore {
    fn has_pending_work(&self) -> bool {
        self.services.values().any(|s| s.has_pending_work())
    }

    fn complete_pending_work(&mut self) {
        for service in self.services.values_mut() {
            service.complete_pending_work();
        }
    }

    fn dispose_returned(&mut self, pools: &mut BufferPools) {
        for (_, mut service) in self.services.drain() {
            service.dispose_returned(pools);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Counter(u32);
    impl Disposable for Counter {}

    #[derive(Debug, Default)]
    struct Other;
    impl Disposable for Other {}

    #[test]
    fn test_one_instance_per_type() {
        let mut store = TypeStore::new(Diagnostics::default());
        store.get_or_create(Counter::default).0 += 1;
        store.get_or_create(|| Counter(100)).0 += 1;
        store.get_or_create(|| Other);

        assert_eq!(store.get::<Counter>(), Some(&Counter(2)));
        assert!(store.contains::<Other>());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_duplicate_add_reported() {
        let diagnostics = Diagnostics::default();
        let mut store = TypeStore::new(diagnostics.clone());
        assert!(store.add(Counter(1)));
        assert!(!store.add(Counter(2)));
        assert_eq!(store.get::<Counter>(), Some(&Counter(1)));
        assert_eq!(diagnostics.count(DiagnosticKind::DuplicateKey), 1);
    }

    #[test]
    fn test_remove_returns_value() {
        let mut store = TypeStore::new(Diagnostics::default());
        store.add(Counter(9));
        assert_eq!(store.remove::<Counter>(), Some(Counter(9)));
        assert!(store.get::<Counter>().is_none());
        assert!(store.is_empty());
    }
}
