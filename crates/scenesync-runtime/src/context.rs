//! Scene context - client state without I/O
//!
//! Owns the reconciliation engine, the connection session and the logical
//! clock. The driver feeds it transport events and elapsed time and drains
//! outgoing frames with [`SceneContext::pop_outgoing`]; tests drive it the
//! same way with a stepped clock.

use std::time::Duration;

use scenesync_core::{Pose, SceneTime, SyncClock, SyncError, SyncResult};
use scenesync_state::{
    FadeNotice, FadePhase, LayoutEntry, ReconciliationEngine, ReconciliationResult, SceneStore,
};
use scenesync_transport::{ConnectionSession, Dispatch, SessionState};
use scenesync_wire::SyncMessage;

use crate::ClientConfig;

/// How a placement was carried out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// `objAdded` queued for the server; the store changes when the
    /// server's `updateScene` comes back
    Sent { name: String },
    /// Not connected; reconciled locally against the baseline
    AppliedLocally {
        name: String,
        result: ReconciliationResult,
    },
}

impl Placement {
    pub fn name(&self) -> &str {
        match self {
            Placement::Sent { name } | Placement::AppliedLocally { name, .. } => name,
        }
    }
}

/// What the renderer needs for one item
#[derive(Debug, Clone, PartialEq)]
pub struct RenderItem {
    pub name: String,
    pub pose: Pose,
    pub visible: bool,
    pub opacity: f32,
}

/// Client-side scene state
pub struct SceneContext {
    engine: ReconciliationEngine,
    session: ConnectionSession,
    clock: SyncClock,
}

impl SceneContext {
    pub fn new(layout: impl IntoIterator<Item = LayoutEntry>, config: &ClientConfig) -> SyncResult<Self> {
        config.fade.validate()?;

        let store = SceneStore::from_layout(layout, config.fade.clone());
        tracing::debug!(items = store.len(), "scene context created");

        Ok(SceneContext {
            engine: ReconciliationEngine::new(store),
            session: ConnectionSession::new(config.session.clone()),
            clock: SyncClock::new(),
        })
    }

    pub fn now(&self) -> SceneTime {
        self.clock.now()
    }

    pub fn store(&self) -> &SceneStore {
        self.engine.store()
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    pub fn session(&self) -> &ConnectionSession {
        &self.session
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// Advance the clock by `dt`, running fades and the heartbeat
    pub fn advance(&mut self, dt: Duration) -> Vec<FadeNotice> {
        let now = self.clock.advance(dt);

        let notices = self.engine.advance(now);
        for notice in &notices {
            self.notify(notice);
        }

        self.session.advance(now);
        notices
    }

    pub fn begin_connect(&mut self) {
        self.session.begin_connect();
    }

    /// The link is open: capture the baseline and send it as `clientScene`
    pub fn on_open(&mut self) -> SyncResult<()> {
        let snapshot = self.engine.refresh_baseline();
        self.session.on_open(snapshot, self.clock.now())
    }

    /// Route one inbound frame. Returns the reconciliation tally when the
    /// frame carried a shared scene.
    pub fn on_text(&mut self, text: &str) -> Option<ReconciliationResult> {
        let now = self.clock.now();
        match self.session.on_text(text, now) {
            Dispatch::Reconcile(items) => {
                let result = self.engine.apply_authoritative(&items, now);
                if result.skipped > 0 {
                    tracing::warn!(skipped = result.skipped, "shared scene has unknown items");
                }
                Some(result)
            }
            Dispatch::Handled | Dispatch::Dropped => None,
        }
    }

    pub fn begin_close(&mut self) {
        self.session.begin_close();
    }

    pub fn on_closed(&mut self) {
        self.session.on_closed();
    }

    pub fn on_transport_error(&mut self, error: &SyncError) {
        self.session.on_transport_error(error);
    }

    pub fn pop_outgoing(&mut self) -> Option<String> {
        self.session.pop_outgoing()
    }

    /// Place the first item that is not currently shown
    pub fn place(&mut self, pose: Pose) -> SyncResult<Placement> {
        let Some(name) = self
            .engine
            .store()
            .first_placeable()
            .map(|item| item.name().to_string())
        else {
            tracing::warn!("every item is already placed");
            return Err(SyncError::NoPlaceableItem);
        };

        self.place_named(&name, pose)
    }

    /// Place a specific item.
    ///
    /// A fade still running on the target is completed first. A sent
    /// placement is staged in the store until the server echoes it; without
    /// an open session it is reconciled locally.
    pub fn place_named(&mut self, name: &str, pose: Pose) -> SyncResult<Placement> {
        let pose = pose.snapped_to_floor();

        let notice = match self.engine.store_mut().get_mut(name) {
            Some(item) if item.fade_state() == FadePhase::FadingOut => item.force_complete(),
            Some(_) => None,
            None => return Err(SyncError::UnknownItem(name.to_string())),
        };
        if let Some(notice) = notice {
            self.notify(&notice);
        }

        let message = SyncMessage::ObjAdded {
            name: name.to_string(),
            pose,
            visible: true,
        };

        match self.session.send(&message) {
            Ok(()) => {
                self.engine.stage_placement(name, pose)?;
                tracing::info!(name = %name, "placement sent");
                Ok(Placement::Sent {
                    name: name.to_string(),
                })
            }
            Err(SyncError::NotConnected) => {
                tracing::info!(name = %name, "not connected, placing locally");
                let result = self
                    .engine
                    .apply_local_placement(name, pose, self.clock.now())?;
                Ok(Placement::AppliedLocally {
                    name: name.to_string(),
                    result,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Cancel the fade on an item, leaving it at full opacity
    pub fn show(&mut self, name: &str) -> SyncResult<()> {
        let item = self
            .engine
            .store_mut()
            .get_mut(name)
            .ok_or_else(|| SyncError::UnknownItem(name.to_string()))?;

        if let Some(notice) = item.show() {
            self.notify(&notice);
        }
        Ok(())
    }

    /// Current render state, in store order
    pub fn render_items(&self) -> Vec<RenderItem> {
        self.engine
            .store()
            .iter()
            .map(|item| RenderItem {
                name: item.name().to_string(),
                pose: item.pose,
                visible: item.visible,
                opacity: item.opacity(),
            })
            .collect()
    }

    fn notify(&mut self, notice: &FadeNotice) {
        if !self.session.is_open() {
            tracing::debug!(name = %notice.name, end = ?notice.end, "fade ended while offline");
            return;
        }

        let message = SyncMessage::UpdateVisibility {
            name: notice.name.clone(),
            visible: false,
        };
        if let Err(e) = self.session.send(&message) {
            tracing::warn!(name = %notice.name, error = %e, "failed to report visibility");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use scenesync_core::Vec3;
    use scenesync_state::FadeEnd;
    use scenesync_wire::ItemUpdate;

    const TICK: Duration = Duration::from_millis(100);

    fn context(names: &[&str]) -> SceneContext {
        let layout = names
            .iter()
            .map(|name| LayoutEntry::new(*name, Pose::identity()));
        SceneContext::new(layout, &ClientConfig::default()).unwrap()
    }

    fn connected(names: &[&str]) -> SceneContext {
        let mut ctx = context(names);
        ctx.begin_connect();
        ctx.on_open().unwrap();
        drain(&mut ctx);
        ctx
    }

    fn drain(ctx: &mut SceneContext) -> Vec<SyncMessage> {
        std::iter::from_fn(|| ctx.pop_outgoing())
            .map(|text| SyncMessage::decode(&text).unwrap())
            .collect()
    }

    fn run_for(ctx: &mut SceneContext, total: Duration) -> Vec<FadeNotice> {
        let mut notices = Vec::new();
        let mut elapsed = Duration::ZERO;
        while elapsed < total {
            notices.extend(ctx.advance(TICK));
            elapsed += TICK;
        }
        notices
    }

    #[test]
    fn test_open_sends_layout() {
        let mut ctx = context(&["chair", "lamp"]);
        ctx.begin_connect();
        ctx.on_open().unwrap();

        match drain(&mut ctx).as_slice() {
            [SyncMessage::ClientScene { items }] => {
                let names: Vec<_> = items.iter().map(|i| i.name.as_str()).collect();
                assert_eq!(names, ["chair", "lamp"]);
                assert!(items.iter().all(|i| !i.visible));
            }
            other => panic!("unexpected frames: {other:?}"),
        }
    }

    #[test]
    fn test_place_online_sends_obj_added() {
        let mut ctx = connected(&["chair", "lamp"]);
        let pose = Pose::at(Vec3::new(0.5, 0.0, -2.0));

        let placement = ctx.place(pose).unwrap();
        assert_eq!(placement, Placement::Sent { name: "chair".into() });

        assert_eq!(
            drain(&mut ctx),
            vec![SyncMessage::ObjAdded {
                name: "chair".into(),
                pose,
                visible: true
            }]
        );

        // staged until the echo starts the fade
        let chair = ctx.store().get("chair").unwrap();
        assert!(chair.visible);
        assert_eq!(chair.pose, pose);
        assert_eq!(chair.fade_state(), FadePhase::Idle);
    }

    #[test]
    fn test_consecutive_online_placements_pick_next_item() {
        let mut ctx = connected(&["chair", "lamp"]);
        let first = Pose::at(Vec3::new(1.0, 0.0, 0.0));
        let second = Pose::at(Vec3::new(2.0, 0.0, 0.0));

        assert_eq!(ctx.place(first).unwrap(), Placement::Sent { name: "chair".into() });
        assert_eq!(ctx.place(second).unwrap(), Placement::Sent { name: "lamp".into() });

        let chair = ctx.store().get("chair").unwrap();
        assert_eq!(chair.pose, first);
        assert!(chair.visible);
        assert_eq!(chair.fade_state(), FadePhase::Idle);
        assert_eq!(ctx.store().get("lamp").unwrap().pose, second);
        assert_eq!(drain(&mut ctx).len(), 2);
    }

    #[test]
    fn test_place_offline_applies_locally() {
        let mut ctx = context(&["chair"]);
        let pose = Pose::at(Vec3::new(1.0, 0.0, 1.0));

        let placement = ctx.place(pose).unwrap();
        assert!(matches!(
            placement,
            Placement::AppliedLocally { ref result, .. } if result.fades_started == 1
        ));

        let chair = ctx.store().get("chair").unwrap();
        assert!(chair.visible);
        assert_eq!(chair.pose, pose);
        assert_eq!(chair.fade_state(), FadePhase::FadingOut);
        assert!(ctx.pop_outgoing().is_none());
    }

    #[test]
    fn test_floor_snap() {
        let mut ctx = context(&["chair"]);
        ctx.place(Pose::at(Vec3::new(1.0, 4e-6, 1.0))).unwrap();
        assert_eq!(ctx.store().get("chair").unwrap().pose.position.y, 0.0);
    }

    #[test]
    fn test_no_placeable_item() {
        let mut ctx = context(&["chair"]);
        ctx.place(Pose::identity()).unwrap();
        assert_eq!(ctx.place(Pose::identity()), Err(SyncError::NoPlaceableItem));
        assert_eq!(
            ctx.place_named("sofa", Pose::identity()),
            Err(SyncError::UnknownItem("sofa".into()))
        );
    }

    #[test]
    fn test_update_scene_drives_fade_and_reports_visibility() {
        let mut ctx = connected(&["chair"]);

        let frame = SyncMessage::UpdateScene {
            items: vec![ItemUpdate::named("chair").with_visible(true)],
        }
        .encode()
        .unwrap();
        let result = ctx.on_text(&frame).unwrap();
        assert_eq!(result.fades_started, 1);

        let notices = run_for(&mut ctx, Duration::from_millis(5000));
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].end, FadeEnd::Completed);

        let chair = ctx.store().get("chair").unwrap();
        assert!(!chair.visible);
        assert_eq!(chair.opacity(), 1.0);
        assert_eq!(
            drain(&mut ctx),
            vec![SyncMessage::UpdateVisibility {
                name: "chair".into(),
                visible: false
            }]
        );
    }

    #[test]
    fn test_replacing_fading_item_completes_fade() {
        let mut ctx = context(&["chair"]);
        ctx.place(Pose::identity()).unwrap();
        run_for(&mut ctx, Duration::from_millis(1000));

        let pose = Pose::at(Vec3::new(2.0, 0.0, 0.0));
        ctx.place_named("chair", pose).unwrap();

        // the old episode ended and a new one began at full opacity
        let chair = ctx.store().get("chair").unwrap();
        assert_eq!(chair.fade_state(), FadePhase::FadingOut);
        assert_eq!(chair.opacity(), 1.0);
        assert_eq!(chair.pose, pose);
    }

    #[test]
    fn test_replacing_fading_item_reports_visibility_once() {
        let mut ctx = connected(&["chair"]);
        ctx.place(Pose::identity()).unwrap();
        let echo = SyncMessage::UpdateScene {
            items: vec![ItemUpdate::named("chair").with_visible(true)],
        }
        .encode()
        .unwrap();
        ctx.on_text(&echo).unwrap();
        run_for(&mut ctx, Duration::from_millis(1000));
        drain(&mut ctx);

        let pose = Pose::at(Vec3::new(2.0, 0.0, 0.0));
        ctx.place_named("chair", pose).unwrap();

        assert_eq!(
            drain(&mut ctx),
            vec![
                SyncMessage::UpdateVisibility {
                    name: "chair".into(),
                    visible: false
                },
                SyncMessage::ObjAdded {
                    name: "chair".into(),
                    pose,
                    visible: true
                },
            ]
        );
        let chair = ctx.store().get("chair").unwrap();
        assert_eq!(chair.pose, pose);
        assert!(chair.visible);
        assert_eq!(chair.opacity(), 1.0);
        assert!(run_for(&mut ctx, TICK).is_empty());
    }

    #[test]
    fn test_show_cancels_fade() {
        let mut ctx = context(&["chair"]);
        ctx.place(Pose::identity()).unwrap();
        run_for(&mut ctx, Duration::from_millis(500));

        ctx.show("chair").unwrap();
        let notices = run_for(&mut ctx, Duration::from_millis(10_000));
        assert!(notices.is_empty());
        assert_eq!(ctx.store().get("chair").unwrap().opacity(), 1.0);
    }

    #[test]
    fn test_render_items() {
        let mut ctx = context(&["a", "b"]);
        ctx.place_named("b", Pose::identity()).unwrap();
        run_for(&mut ctx, Duration::from_millis(2500));

        let items = ctx.render_items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "a");
        assert!(!items[0].visible);
        assert!(items[1].visible);
        assert!((items[1].opacity - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_heartbeat_stops_after_close() {
        let mut ctx = connected(&["chair"]);
        ctx.advance(Duration::from_secs(20));
        assert_eq!(drain(&mut ctx), vec![SyncMessage::Ping]);

        ctx.begin_close();
        ctx.on_closed();
        ctx.advance(Duration::from_secs(60));
        assert!(drain(&mut ctx).is_empty());
    }

    proptest! {
        #[test]
        fn prop_placements_never_grow_store(ys in proptest::collection::vec(-1.0f64..1.0, 0..8)) {
            let mut ctx = context(&["a", "b", "c"]);
            let mut placed = 0;
            for y in ys {
                match ctx.place(Pose::at(Vec3::new(0.0, y, 0.0))) {
                    Ok(_) => placed += 1,
                    Err(e) => prop_assert_eq!(e, SyncError::NoPlaceableItem),
                }
            }
            prop_assert!(placed <= 3);
            prop_assert_eq!(ctx.store().len(), 3);
        }
    }
}
