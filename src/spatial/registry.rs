use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use super::{SpatialMap, Tween};
use crate::{EditError, EditResult, TransformController};

type Key = (u64, Tween);

/// At most one [SpatialMap] per (controller, tween).
///
/// Maps live until removed or until the registry is cleared.
#[derive(Debug, Default)]
pub struct SpatialMapRegistry {
    maps: RwLock<HashMap<Key, Arc<SpatialMap>>>,
}

impl SpatialMapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared map for this key, built on first request.
    pub fn get_or_create(
        &self,
        controller: &Arc<TransformController>,
        tween: Tween,
    ) -> Arc<SpatialMap> {
        let key = (controller.id(), tween);
        if let Some(map) = self.maps.read().expect("should not be poisoned").get(&key) {
            return map.clone();
        }
        let mut maps = self.maps.write().expect("should not be poisoned");
        // another caller may have built it between the locks
        maps.entry(key)
            .or_insert_with(|| Arc::new(SpatialMap::new(controller.clone(), tween)))
            .clone()
    }

    pub fn get(
        &self,
        controller: &TransformController,
        tween: Tween,
    ) -> EditResult<Arc<SpatialMap>> {
        self.maps
            .read()
            .expect("should not be poisoned")
            .get(&(controller.id(), tween))
            .cloned()
            .ok_or_else(|| {
                EditError::KeyNotFound(format!(
                    "no spatial map for controller {} ({tween:?})",
                    controller.id()
                ))
            })
    }

    /// Store `map` under its own key, returning the map it displaced.
    pub fn insert(&self, map: Arc<SpatialMap>) -> Option<Arc<SpatialMap>> {
        let key = (map.controller().id(), map.tween());
        self.maps
            .write()
            .expect("should not be poisoned")
            .insert(key, map)
    }

    pub fn contains(&self, controller: &TransformController, tween: Tween) -> bool {
        self.maps
            .read()
            .expect("should not be poisoned")
            .contains_key(&(controller.id(), tween))
    }

    pub fn remove(
        &self,
        controller: &TransformController,
        tween: Tween,
    ) -> Option<Arc<SpatialMap>> {
        self.maps
            .write()
            .expect("should not be poisoned")
            .remove(&(controller.id(), tween))
    }

    /// Drop every map belonging to `controller`; returns how many there were.
    pub fn remove_controller(&self, controller: &TransformController) -> usize {
        let mut maps = self.maps.write().expect("should not be poisoned");
        let before = maps.len();
        maps.retain(|(id, _), _| *id != controller.id());
        before - maps.len()
    }

    pub fn clear(&self) {
        self.maps.write().expect("should not be poisoned").clear();
    }

    pub fn len(&self) -> usize {
        self.maps.read().expect("should not be poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ControllerConfig,
        model::share,
        tests::{Caps, StubModel, init_logger, random_points},
    };

    fn controller() -> Arc<TransformController> {
        init_logger();
        let model = share(StubModel::identity(&random_points(20, 100.0), Caps::all()));
        Arc::new(TransformController::new(model, ControllerConfig::default()).unwrap())
    }

    #[test]
    fn one_map_per_key() {
        let registry = SpatialMapRegistry::new();
        let c = controller();
        let a = registry.get_or_create(&c, Tween::Source);
        let b = registry.get_or_create(&c, Tween::Source);
        assert!(Arc::ptr_eq(&a, &b));
        let t = registry.get_or_create(&c, Tween::Target);
        assert!(!Arc::ptr_eq(&a, &t));
        let half = registry.get_or_create(&c, Tween::blend(0.5).unwrap());
        assert!(Arc::ptr_eq(&half, &registry.get_or_create(&c, Tween::blend(0.5).unwrap())));
        assert!(Arc::ptr_eq(&a, &registry.get_or_create(&c, Tween::blend(0.0).unwrap())));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn controllers_are_separate_keys() {
        let registry = SpatialMapRegistry::new();
        let c1 = controller();
        let c2 = controller();
        let a = registry.get_or_create(&c1, Tween::Source);
        let b = registry.get_or_create(&c2, Tween::Source);
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.remove_controller(&c1), 1);
        assert!(!registry.contains(&c1, Tween::Source));
        assert!(registry.contains(&c2, Tween::Source));
    }

    #[test]
    fn get_missing_is_key_not_found() {
        let registry = SpatialMapRegistry::new();
        let c = controller();
        assert!(matches!(
            registry.get(&c, Tween::Source),
            Err(EditError::KeyNotFound(_))
        ));
        let map = registry.get_or_create(&c, Tween::Source);
        assert!(Arc::ptr_eq(&map, &registry.get(&c, Tween::Source).unwrap()));
    }

    #[test]
    fn insert_and_remove() {
        let registry = SpatialMapRegistry::new();
        let c = controller();
        let first = Arc::new(SpatialMap::new(c.clone(), Tween::Target));
        assert!(registry.insert(first.clone()).is_none());
        let second = Arc::new(SpatialMap::new(c.clone(), Tween::Target));
        let displaced = registry.insert(second.clone()).unwrap();
        assert!(Arc::ptr_eq(&displaced, &first));
        assert!(Arc::ptr_eq(&registry.get_or_create(&c, Tween::Target), &second));
        assert!(registry.remove(&c, Tween::Target).is_some());
        assert!(registry.remove(&c, Tween::Target).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn clear_releases_subscriptions() {
        let registry = SpatialMapRegistry::new();
        let c = controller();
        let before = c.changed().listener_count();
        registry.get_or_create(&c, Tween::Source);
        registry.get_or_create(&c, Tween::Target);
        assert_eq!(c.changed().listener_count(), before + 2);
        registry.clear();
        assert!(registry.is_empty());
        assert_eq!(c.changed().listener_count(), before);
    }

    #[test]
    fn shared_map_sees_edits() {
        let registry = SpatialMapRegistry::new();
        let c = controller();
        let map = registry.get_or_create(&c, Tween::Source);
        c.set_point(3, [500.0, 500.0], crate::Space::Source).unwrap();
        let again = registry.get_or_create(&c, Tween::Source);
        assert_eq!(
            again.find_nearest_within(&[[500.0, 500.0]], 1.0),
            std::collections::BTreeSet::from([3usize])
        );
        assert_eq!(map.rebuild_count(), 2);
    }
}
