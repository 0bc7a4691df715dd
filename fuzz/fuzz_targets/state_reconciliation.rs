#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use scenesync_core::{Pose, SceneTime, Vec3};
use scenesync_state::{FadeConfig, FadePhase, LayoutEntry, ReconciliationEngine, SceneStore};
use scenesync_wire::ItemUpdate;

const NAMES: [&str; 4] = ["chair", "lamp", "sofa", "ghost"];

#[derive(Arbitrary, Debug)]
enum Op {
    Update { item: u8, visible: Option<bool>, x: i16 },
    Place { item: u8 },
    Advance { millis: u16 },
}

fuzz_target!(|ops: Vec<Op>| {
    // "ghost" is never in the layout
    let layout = NAMES[..3]
        .iter()
        .map(|name| LayoutEntry::new(*name, Pose::identity()));
    let mut engine =
        ReconciliationEngine::new(SceneStore::from_layout(layout, FadeConfig::default()));
    let mut now = SceneTime::ZERO;

    for op in ops {
        match op {
            Op::Update { item, visible, x } => {
                let mut update = ItemUpdate::named(NAMES[item as usize % NAMES.len()]);
                update.visible = visible;
                update.position = Some(Vec3::new(f64::from(x), 0.0, 0.0));
                engine.apply_authoritative(&[update], now);
            }
            Op::Place { item } => {
                let name = NAMES[item as usize % NAMES.len()];
                let placed = engine.apply_local_placement(name, Pose::identity(), now);
                assert_eq!(placed.is_ok(), name != "ghost");
            }
            Op::Advance { millis } => {
                now = now.saturating_add(std::time::Duration::from_millis(u64::from(millis)));
                engine.advance(now);
            }
        }

        assert!(!engine.store().contains("ghost"));
        for item in engine.store().iter() {
            let opacity = item.opacity();
            assert!((0.0..=1.0).contains(&opacity));
            if item.fade_state() == FadePhase::Completed {
                assert!(!item.visible);
                assert!(!item.fade().is_ticking());
            }
        }
    }
});
