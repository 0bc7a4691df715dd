//! End-to-end scenarios
//!
//! Each scenario builds its own [`Scenario`], drives it, and reports every
//! expectation that did not hold.

use std::time::Duration;

use scenesync_core::{Pose, Quat, SyncResult, Vec3};
use scenesync_runtime::Placement;
use scenesync_state::{FadeEnd, FadePhase, LayoutEntry};
use scenesync_wire::SyncMessage;

use crate::{RelayConfig, Scenario};

// ============================================================================
// REPORTING
// ============================================================================

/// Outcome of one scenario
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub name: &'static str,
    pub failures: Vec<String>,
}

impl ScenarioReport {
    fn new(name: &'static str) -> Self {
        ScenarioReport {
            name,
            failures: Vec::new(),
        }
    }

    fn check(&mut self, ok: bool, what: impl Into<String>) {
        if !ok {
            self.failures.push(what.into());
        }
    }

    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

fn layout(names: &[&str]) -> Vec<LayoutEntry> {
    names
        .iter()
        .map(|name| LayoutEntry::new(*name, Pose::identity()))
        .collect()
}

const FADE: Duration = Duration::from_millis(5000);

// ============================================================================
// SCENARIOS
// ============================================================================

/// Shared visibility starts a fade that ends with the item hidden, and the
/// relay hears about it
pub fn fade_after_shared_visibility() -> SyncResult<ScenarioReport> {
    let mut report = ScenarioReport::new("fade_after_shared_visibility");
    let mut scenario = Scenario::new(RelayConfig::default());
    let a = scenario.add_client(&layout(&["chair"]))?;
    scenario.connect(a)?;

    scenario.place(a, Pose::at(Vec3::new(0.0, 0.0, -1.0)))?;
    let chair = scenario.context(a).store().get("chair");
    report.check(
        chair.map(|c| c.fade_state()) == Some(FadePhase::FadingOut),
        "chair should be fading after the broadcast",
    );

    scenario.run_for(FADE);
    let Some(chair) = scenario.context(a).store().get("chair") else {
        report.check(false, "chair vanished from the store");
        return Ok(report);
    };
    report.check(!chair.visible, "chair should be hidden after the fade");
    report.check(chair.fade_state() == FadePhase::Completed, "fade should be completed");
    report.check(chair.opacity() == 1.0, "opacity should be reset");

    let notices = scenario.client(a).notices();
    report.check(
        notices.len() == 1 && notices[0].end == FadeEnd::Completed,
        format!("expected one completion notice, got {notices:?}"),
    );
    report.check(
        scenario.relay().item("chair").map(|c| c.visible) == Some(false),
        "relay should record the item as hidden",
    );
    Ok(report)
}

/// An offline placement reaches the same state as the same placement
/// echoed by the server
pub fn offline_placement_matches_online() -> SyncResult<ScenarioReport> {
    let mut report = ScenarioReport::new("offline_placement_matches_online");
    let mut scenario = Scenario::new(RelayConfig::default());
    let online = scenario.add_client(&layout(&["lamp"]))?;
    let offline = scenario.add_client(&layout(&["lamp"]))?;
    scenario.connect(online)?;

    let pose = Pose::new(
        Vec3::new(0.4, 0.0, -2.0),
        Quat::new(0.0, 0.7071067811865476, 0.0, 0.7071067811865476),
        Vec3::one(),
    );
    let sent = scenario.place_named(online, "lamp", pose)?;
    let local = scenario.place_named(offline, "lamp", pose)?;
    report.check(matches!(sent, Placement::Sent { .. }), "online placement should be sent");
    report.check(
        matches!(local, Placement::AppliedLocally { .. }),
        "offline placement should apply locally",
    );

    let a = scenario.context(online).store().get("lamp");
    let b = scenario.context(offline).store().get("lamp");
    match (a, b) {
        (Some(a), Some(b)) => {
            report.check(a.pose == b.pose, "poses should match");
            report.check(a.visible && b.visible, "both should be visible");
            report.check(
                a.fade_state() == FadePhase::FadingOut && b.fade_state() == FadePhase::FadingOut,
                "both should be fading",
            );
        }
        _ => report.check(false, "lamp missing from a store"),
    }
    Ok(report)
}

/// Both quaternion encodings produce the same pose
pub fn mixed_quaternion_encodings() -> SyncResult<ScenarioReport> {
    let mut report = ScenarioReport::new("mixed_quaternion_encodings");
    let mut scenario = Scenario::new(RelayConfig::default());
    let named = scenario.add_client(&layout(&["x"]))?;
    let positional = scenario.add_client(&layout(&["x"]))?;

    let frames = [
        (named, r#"{"type":"updateScene","sharedScene":[{"name":"x","quaternion":{"_x":0,"_y":0,"_z":0,"_w":1}}]}"#),
        (positional, r#"{"type":"updateScene","sharedScene":[{"name":"x","quaternion":[0,0,0,1]}]}"#),
    ];
    for (idx, frame) in frames {
        let message = SyncMessage::decode(frame)?;
        report.check(
            matches!(message, SyncMessage::UpdateScene { .. }),
            format!("client {idx}: frame should decode as updateScene"),
        );
    }

    scenario.connect(named)?;
    scenario.connect(positional)?;
    // feed the frames directly, as the relay would
    let results: Vec<_> = frames
        .iter()
        .map(|(idx, frame)| scenario.deliver(*idx, frame))
        .collect();
    report.check(
        results.iter().all(|r| r.as_ref().map(|r| r.applied) == Some(1)),
        "each frame should apply to one item",
    );

    let a = scenario.context(named).store().get("x").map(|x| x.pose);
    let b = scenario.context(positional).store().get("x").map(|x| x.pose);
    report.check(a.is_some() && a == b, format!("poses differ: {a:?} vs {b:?}"));
    report.check(
        a.map(|p| p.rotation) == Some(Quat::identity()),
        "rotation should be identity",
    );
    Ok(report)
}

/// Closing before the first heartbeat means no ping is ever sent
pub fn heartbeat_silenced_on_close() -> SyncResult<ScenarioReport> {
    let mut report = ScenarioReport::new("heartbeat_silenced_on_close");
    let mut scenario = Scenario::new(RelayConfig::default());
    let a = scenario.add_client(&layout(&["chair"]))?;
    scenario.connect(a)?;

    scenario.run_for(Duration::from_secs(10));
    scenario.disconnect(a)?;
    scenario.run_for(Duration::from_secs(60));

    report.check(scenario.relay().stats().pings == 0, "no ping should reach the relay");
    report.check(
        scenario.context(a).session().stats().pings_sent == 0,
        "no ping should be queued",
    );
    report.check(
        !scenario.context(a).session().heartbeat_armed(),
        "heartbeat should be disarmed",
    );
    Ok(report)
}

/// A client that joins late picks up a placement still in progress
pub fn late_joiner_sees_placement() -> SyncResult<ScenarioReport> {
    let mut report = ScenarioReport::new("late_joiner_sees_placement");
    let mut scenario = Scenario::new(RelayConfig::default());
    let early = scenario.add_client(&layout(&["chair", "lamp"]))?;
    let late = scenario.add_client(&layout(&["chair", "lamp"]))?;
    scenario.connect(early)?;

    let pose = Pose::at(Vec3::new(1.0, 0.0, 1.0));
    scenario.place_named(early, "lamp", pose)?;
    scenario.run_for(Duration::from_millis(1000));
    scenario.connect(late)?;

    let lamp = scenario.context(late).store().get("lamp");
    report.check(
        lamp.map(|l| (l.pose, l.fade_state())) == Some((pose, FadePhase::FadingOut)),
        "late client should start the lamp's fade",
    );
    report.check(
        scenario.context(late).store().get("chair").map(|c| c.visible) == Some(false),
        "chair stays hidden",
    );
    Ok(report)
}

/// Every reconnect re-sends the client scene exactly once, and heartbeats
/// resume on the new link only
pub fn reconnect_resends_scene() -> SyncResult<ScenarioReport> {
    let mut report = ScenarioReport::new("reconnect_resends_scene");
    let mut scenario = Scenario::new(RelayConfig::default());
    let a = scenario.add_client(&layout(&["chair"]))?;

    scenario.connect(a)?;
    scenario.run_for(Duration::from_secs(25));
    scenario.drop_link(a)?;
    scenario.run_for(Duration::from_secs(30));
    scenario.connect(a)?;
    scenario.run_for(Duration::from_secs(25));

    let stats = scenario.relay().stats();
    report.check(stats.client_scenes == 2, format!("client scenes: {}", stats.client_scenes));
    report.check(stats.pings == 2, format!("pings: {}", stats.pings));
    report.check(
        scenario.context(a).session().stats().opens == 2,
        "session should have opened twice",
    );
    report.check(
        scenario.context(a).session().last_pong().is_some(),
        "pong should have been recorded",
    );
    Ok(report)
}

/// Run every scenario
pub fn run_all() -> SyncResult<Vec<ScenarioReport>> {
    Ok(vec![
        fade_after_shared_visibility()?,
        offline_placement_matches_online()?,
        mixed_quaternion_encodings()?,
        heartbeat_silenced_on_close()?,
        late_joiner_sees_placement()?,
        reconnect_resends_scene()?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_passed(report: ScenarioReport) {
        assert!(report.passed(), "{}: {:?}", report.name, report.failures);
    }

    #[test]
    fn test_fade_after_shared_visibility() {
        assert_passed(fade_after_shared_visibility().unwrap());
    }

    #[test]
    fn test_offline_placement_matches_online() {
        assert_passed(offline_placement_matches_online().unwrap());
    }

    #[test]
    fn test_mixed_quaternion_encodings() {
        assert_passed(mixed_quaternion_encodings().unwrap());
    }

    #[test]
    fn test_heartbeat_silenced_on_close() {
        assert_passed(heartbeat_silenced_on_close().unwrap());
    }

    #[test]
    fn test_late_joiner_sees_placement() {
        assert_passed(late_joiner_sees_placement().unwrap());
    }

    #[test]
    fn test_reconnect_resends_scene() {
        assert_passed(reconnect_resends_scene().unwrap());
    }

    #[test]
    fn test_run_all() {
        let reports = run_all().unwrap();
        assert_eq!(reports.len(), 6);
        assert!(reports.iter().all(ScenarioReport::passed));
    }
}
