//! Scene item store - the local replica of the shared scene

use std::collections::HashMap;

use scenesync_core::{Pose, SceneTime};
use scenesync_wire::ItemSnapshot;

use crate::{FadeConfig, FadeNotice, SceneItem};

/// Startup record supplied by asset loading
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutEntry {
    pub name: String,
    pub pose: Pose,
}

impl LayoutEntry {
    pub fn new(name: impl Into<String>, pose: Pose) -> Self {
        Self {
            name: name.into(),
            pose,
        }
    }
}

/// Scene item store
///
/// Items keep the order they were first inserted in, so rendering walks
/// them in a stable order. Names are unique.
#[derive(Debug, Default)]
pub struct SceneStore {
    items: Vec<SceneItem>,
    index: HashMap<String, usize>,
    fade: FadeConfig,
}

impl SceneStore {
    pub fn new(fade: FadeConfig) -> Self {
        SceneStore {
            items: Vec::new(),
            index: HashMap::new(),
            fade,
        }
    }

    /// Build from the startup layout; every item starts not visible
    pub fn from_layout(layout: impl IntoIterator<Item = LayoutEntry>, fade: FadeConfig) -> Self {
        let mut store = SceneStore::new(fade);
        for entry in layout {
            if store.contains(&entry.name) {
                tracing::warn!(name = %entry.name, "duplicate name in layout, replacing");
            }
            store.upsert(&entry.name, entry.pose, false);
        }
        store
    }

    pub fn fade_config(&self) -> &FadeConfig {
        &self.fade
    }

    /// Insert a new item, or replace pose and visibility of an existing one.
    /// An existing item keeps its fade state.
    pub fn upsert(&mut self, name: &str, pose: Pose, visible: bool) -> &mut SceneItem {
        let idx = match self.index.get(name) {
            Some(&idx) => idx,
            None => {
                let idx = self.items.len();
                self.items.push(SceneItem::new(name, pose, &self.fade));
                self.index.insert(name.to_string(), idx);
                idx
            }
        };

        let item = &mut self.items[idx];
        item.pose = pose;
        item.visible = visible;
        item
    }

    pub fn get(&self, name: &str) -> Option<&SceneItem> {
        self.index.get(name).map(|&idx| &self.items[idx])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut SceneItem> {
        self.index.get(name).map(|&idx| &mut self.items[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Remove an item together with its fade controller
    pub fn remove(&mut self, name: &str) -> Option<SceneItem> {
        let idx = self.index.remove(name)?;
        let item = self.items.remove(idx);
        for slot in self.index.values_mut() {
            if *slot > idx {
                *slot -= 1;
            }
        }
        Some(item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &SceneItem> {
        self.items.iter()
    }

    /// First item, in store order, that is not committed visible
    pub fn first_placeable(&self) -> Option<&SceneItem> {
        self.items.iter().find(|item| !item.visible)
    }

    /// Full contents as wire records
    pub fn snapshot(&self) -> Vec<ItemSnapshot> {
        self.items.iter().map(SceneItem::snapshot).collect()
    }

    /// Number of items with an armed fade schedule
    pub fn active_fades(&self) -> usize {
        self.items.iter().filter(|i| i.fade().is_ticking()).count()
    }

    /// Drive every item's fade up to `now`
    pub fn advance_fades(&mut self, now: SceneTime) -> Vec<FadeNotice> {
        self.items
            .iter_mut()
            .filter_map(|item| item.advance(now))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FadePhase;
    use proptest::prelude::*;
    use scenesync_core::Vec3;

    fn layout(names: &[&str]) -> Vec<LayoutEntry> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| LayoutEntry::new(*name, Pose::at(Vec3::new(i as f64, 0.0, 0.0))))
            .collect()
    }

    #[test]
    fn test_store_basic() {
        let store = SceneStore::from_layout(layout(&["chair", "lamp"]), FadeConfig::default());

        assert_eq!(store.len(), 2);
        assert!(store.contains("lamp"));
        assert!(store.get("table").is_none());

        let lamp = store.get("lamp").unwrap();
        assert!(!lamp.visible);
        assert_eq!(lamp.fade_state(), FadePhase::Idle);
        assert_eq!(lamp.pose.position.x, 1.0);
    }

    #[test]
    fn test_iteration_order_is_stable() {
        let mut store =
            SceneStore::from_layout(layout(&["c", "a", "b"]), FadeConfig::default());
        store.upsert("a", Pose::identity(), true);
        store.upsert("d", Pose::identity(), false);

        let names: Vec<_> = store.iter().map(|i| i.name().to_string()).collect();
        assert_eq!(names, ["c", "a", "b", "d"]);
    }

    #[test]
    fn test_upsert_preserves_fade() {
        let mut store = SceneStore::from_layout(layout(&["chair"]), FadeConfig::default());
        store
            .get_mut("chair")
            .unwrap()
            .start_fade_out(SceneTime::ZERO);

        store.upsert("chair", Pose::at(Vec3::new(5.0, 0.0, 0.0)), true);
        let chair = store.get("chair").unwrap();
        assert_eq!(chair.fade_state(), FadePhase::FadingOut);
        assert_eq!(chair.pose.position.x, 5.0);
        assert!(chair.visible);
    }

    #[test]
    fn test_remove_reindexes() {
        let mut store =
            SceneStore::from_layout(layout(&["a", "b", "c"]), FadeConfig::default());
        let removed = store.remove("a").unwrap();
        assert_eq!(removed.name(), "a");

        assert!(store.get("a").is_none());
        assert_eq!(store.get("c").unwrap().name(), "c");
        assert_eq!(store.get("b").unwrap().pose.position.x, 1.0);
        assert!(store.remove("a").is_none());
    }

    #[test]
    fn test_duplicate_layout_names() {
        let store = SceneStore::from_layout(layout(&["a", "a"]), FadeConfig::default());
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("a").unwrap().pose.position.x, 1.0);
    }

    #[test]
    fn test_first_placeable() {
        let mut store = SceneStore::from_layout(layout(&["a", "b"]), FadeConfig::default());
        assert_eq!(store.first_placeable().unwrap().name(), "a");

        store.get_mut("a").unwrap().visible = true;
        assert_eq!(store.first_placeable().unwrap().name(), "b");

        store.get_mut("b").unwrap().visible = true;
        assert!(store.first_placeable().is_none());
    }

    #[test]
    fn test_advance_fades_reports_each_once() {
        let mut store = SceneStore::from_layout(layout(&["a", "b"]), FadeConfig::default());
        store.get_mut("a").unwrap().start_fade_out(SceneTime::ZERO);
        store
            .get_mut("b")
            .unwrap()
            .start_fade_out(SceneTime::from_millis(1000));
        assert_eq!(store.active_fades(), 2);

        let first = store.advance_fades(SceneTime::from_millis(5000));
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].name, "a");

        let second = store.advance_fades(SceneTime::from_millis(6000));
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].name, "b");

        assert!(store.advance_fades(SceneTime::from_millis(60_000)).is_empty());
        assert_eq!(store.active_fades(), 0);
    }

    #[test]
    fn test_restart_does_not_double_schedule() {
        let mut store = SceneStore::from_layout(layout(&["a"]), FadeConfig::default());
        store.get_mut("a").unwrap().start_fade_out(SceneTime::ZERO);
        store.advance_fades(SceneTime::from_millis(2000));
        store
            .get_mut("a")
            .unwrap()
            .start_fade_out(SceneTime::from_millis(2000));
        assert_eq!(store.active_fades(), 1);

        // 30 steps remain after the restart
        assert!(store.advance_fades(SceneTime::from_millis(4999)).is_empty());
        assert_eq!(store.advance_fades(SceneTime::from_millis(5000)).len(), 1);
        assert!(store.advance_fades(SceneTime::from_millis(9000)).is_empty());
    }

    proptest! {
        #[test]
        fn prop_names_stay_unique(ops in proptest::collection::vec((0u8..6, any::<bool>()), 0..40)) {
            let mut store = SceneStore::new(FadeConfig::default());
            for (n, visible) in ops {
                store.upsert(&format!("item{}", n), Pose::identity(), visible);
            }

            let mut names: Vec<_> = store.iter().map(|i| i.name().to_string()).collect();
            let total = names.len();
            names.sort();
            names.dedup();
            prop_assert_eq!(names.len(), total);
            prop_assert!(total <= 6);
        }
    }
}
