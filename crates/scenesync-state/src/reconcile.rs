//! Reconciliation of authoritative snapshots into the local store

use scenesync_core::{Pose, SceneTime, SyncError, SyncResult};
use scenesync_wire::{ItemSnapshot, ItemUpdate};

use crate::{FadeNotice, SceneStore};

/// Outcome of reconciling one batch
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconciliationResult {
    /// Items found and updated
    pub applied: u32,
    /// Items skipped because the name is not in the store
    pub skipped: u32,
    /// Fade-outs started by this batch
    pub fades_started: u32,
}

/// State reconciliation engine
///
/// Owns the scene store and the baseline: the records last sent to the
/// server in `clientScene`, which offline placements are reconciled against.
pub struct ReconciliationEngine {
    store: SceneStore,
    baseline: Vec<ItemSnapshot>,
}

impl ReconciliationEngine {
    pub fn new(store: SceneStore) -> Self {
        let baseline = store.snapshot();
        ReconciliationEngine { store, baseline }
    }

    /// Get reference to the store
    pub fn store(&self) -> &SceneStore {
        &self.store
    }

    /// Get mutable reference to the store
    pub fn store_mut(&mut self) -> &mut SceneStore {
        &mut self.store
    }

    pub fn baseline(&self) -> &[ItemSnapshot] {
        &self.baseline
    }

    /// Re-capture the baseline from the store and return it
    pub fn refresh_baseline(&mut self) -> Vec<ItemSnapshot> {
        self.baseline = self.store.snapshot();
        self.baseline.clone()
    }

    /// Apply an authoritative snapshot.
    ///
    /// Unknown names are skipped, never created. An item that ends up
    /// visible and is not already fading starts its fade-out: visibility
    /// from the server is the start of a timed teardown.
    pub fn apply_authoritative(
        &mut self,
        items: &[ItemUpdate],
        now: SceneTime,
    ) -> ReconciliationResult {
        let mut result = ReconciliationResult::default();

        for update in items {
            let Some(item) = self.store.get_mut(&update.name) else {
                tracing::warn!(name = %update.name, "snapshot references unknown item, skipping");
                result.skipped += 1;
                continue;
            };

            if let Some(position) = update.position {
                item.pose.position = position;
            }
            if let Some(rotation) = update.rotation {
                item.pose.rotation = rotation;
            }
            if let Some(scale) = update.scale {
                item.pose.scale = scale;
            }
            if let Some(visible) = update.visible {
                item.visible = visible;
            }

            if item.visible && !item.is_fading() {
                item.start_fade_out(now);
                result.fades_started += 1;
                tracing::debug!(name = %update.name, "fade-out started");
            }

            result.applied += 1;
        }

        result
    }

    /// Write a placement into the store ahead of the server echo.
    ///
    /// The item becomes visible at `pose` without starting a fade; the
    /// echoed `updateScene` starts it through [`Self::apply_authoritative`].
    pub fn stage_placement(&mut self, name: &str, pose: Pose) -> SyncResult<()> {
        let item = self
            .store
            .get_mut(name)
            .ok_or_else(|| SyncError::UnknownItem(name.to_string()))?;
        item.pose = pose;
        item.visible = true;
        Ok(())
    }

    /// Apply a placement locally while the connection is down.
    ///
    /// Overwrites the baseline record and runs it through
    /// [`Self::apply_authoritative`], exactly as if the server had echoed it.
    pub fn apply_local_placement(
        &mut self,
        name: &str,
        pose: Pose,
        now: SceneTime,
    ) -> SyncResult<ReconciliationResult> {
        let Some(record) = self.baseline.iter_mut().find(|r| r.name == name) else {
            tracing::warn!(name = %name, "offline placement for unknown item");
            return Err(SyncError::UnknownItem(name.to_string()));
        };

        record.pose = pose;
        record.visible = true;
        let update = ItemUpdate::from(&*record);

        Ok(self.apply_authoritative(&[update], now))
    }

    /// Drive all fades up to `now`
    pub fn advance(&mut self, now: SceneTime) -> Vec<FadeNotice> {
        self.store.advance_fades(now)
    }
}
