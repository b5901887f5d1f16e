//! Declaration catalog.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::trace;

use super::Entity;
use crate::constraint::ConstraintDecl;

/// Per-type declaration lists.
///
/// A type's list is built once from [`Entity::declarations`] followed by
/// any registered declarations, then published as an immutable
/// `Arc<[ConstraintDecl]>`. Registering a declaration drops the cached list
/// so it is rebuilt on next use.
#[derive(Debug, Default)]
pub struct DeclarationCatalog {
    cache: DashMap<String, Arc<[ConstraintDecl]>>,
    registered: RwLock<HashMap<String, Vec<ConstraintDecl>>>,
}

impl DeclarationCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declarations of `T`.
    pub fn declarations_for<T: Entity>(&self) -> Arc<[ConstraintDecl]> {
        if let Some(cached) = self.cache.get(T::NAME) {
            return Arc::clone(cached.value());
        }

        // The read guard is held until the list is published, so a
        // concurrent `register` invalidates after the insert, not before it.
        let registered = self.registered.read();
        let mut list = T::declarations();
        if let Some(extra) = registered.get(T::NAME) {
            list.extend(extra.iter().cloned());
        }
        trace!(entity = T::NAME, count = list.len(), "declarations cached");

        let list: Arc<[ConstraintDecl]> = list.into();
        let published = Arc::clone(
            self.cache
                .entry(T::NAME.to_string())
                .or_insert(list)
                .value(),
        );
        drop(registered);
        published
    }

    /// Declarations known for an entity name without its Rust type: the
    /// cached list if the type has been used, else the registered ones.
    pub fn declarations(&self, entity: &str) -> Arc<[ConstraintDecl]> {
        if let Some(cached) = self.cache.get(entity) {
            return Arc::clone(cached.value());
        }
        self.registered
            .read()
            .get(entity)
            .map(|list| list.as_slice().into())
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }

    /// Add a declaration for an entity type.
    pub fn register(&self, entity: impl Into<String>, decl: impl Into<ConstraintDecl>) {
        let entity = entity.into();
        self.registered
            .write()
            .entry(entity.clone())
            .or_default()
            .push(decl.into());
        self.cache.remove(&entity);
        trace!(entity = %entity, "declaration registered");
    }

    /// Add every declaration of a per-entity map.
    pub fn register_all(&self, declarations: &BTreeMap<String, Vec<ConstraintDecl>>) {
        for (entity, list) in declarations {
            for decl in list {
                self.register(entity.as_str(), decl.clone());
            }
        }
    }

    /// Entity names with a registered declaration, sorted.
    pub fn registered_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registered.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::constraint::{BoundedCountDecl, NonEmptyDecl};

    #[derive(Serialize, Deserialize)]
    struct Zone {
        id: i64,
    }

    impl Entity for Zone {
        const NAME: &'static str = "Zone";

        fn declarations() -> Vec<ConstraintDecl> {
            vec![NonEmptyDecl::new("find Zone", "zone.none").into()]
        }
    }

    #[derive(Serialize, Deserialize)]
    struct SubZone {
        id: i64,
    }

    impl Entity for SubZone {
        const NAME: &'static str = "SubZone";

        fn declarations() -> Vec<ConstraintDecl> {
            let mut list = Zone::declarations();
            list.push(ConstraintDecl::Identity);
            list
        }
    }

    #[test]
    fn test_cached_once() {
        let catalog = DeclarationCatalog::new();
        let a = catalog.declarations_for::<Zone>();
        let b = catalog.declarations_for::<Zone>();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.len(), 1);
        assert_eq!(catalog.declarations("Zone").len(), 1);
    }

    #[test]
    fn test_inherited_markers() {
        let catalog = DeclarationCatalog::new();
        let list = catalog.declarations_for::<SubZone>();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1], ConstraintDecl::Identity);
    }

    #[test]
    fn test_register_invalidates() {
        let catalog = DeclarationCatalog::new();
        let before = catalog.declarations_for::<Zone>();
        catalog.register("Zone", BoundedCountDecl::new("count Zone", "zone.many").max(10));

        let after = catalog.declarations_for::<Zone>();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.len(), 2);
        assert_eq!(catalog.registered_types(), vec!["Zone".to_string()]);
    }

    #[test]
    fn test_register_during_lookups_is_never_lost() {
        let catalog = DeclarationCatalog::new();
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..200 {
                        catalog.declarations_for::<Zone>();
                    }
                });
            }
            s.spawn(|| {
                for i in 0..50 {
                    catalog.register("Zone", BoundedCountDecl::new("count Zone", "zone.many").max(i));
                }
            });
        });

        assert_eq!(catalog.declarations_for::<Zone>().len(), 51);
    }

    #[test]
    fn test_untyped_lookup() {
        let catalog = DeclarationCatalog::new();
        assert!(catalog.declarations("Country").is_empty());

        let mut map = BTreeMap::new();
        map.insert("Country".to_string(), vec![ConstraintDecl::Identity]);
        catalog.register_all(&map);
        assert_eq!(catalog.declarations("Country").len(), 1);
    }
}
