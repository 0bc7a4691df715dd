//! Scene items

use scenesync_core::{Pose, SceneTime};
use scenesync_wire::ItemSnapshot;

use crate::{FadeConfig, FadeController, FadeEnd, FadePhase};

/// Notification that an item's fade episode ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FadeNotice {
    pub name: String,
    pub end: FadeEnd,
}

/// One named, placeable object
#[derive(Debug, Clone)]
pub struct SceneItem {
    name: String,
    /// Current pose, written by reconciliation
    pub pose: Pose,
    /// Committed visibility, written by reconciliation
    pub visible: bool,
    fade: FadeController,
}

impl SceneItem {
    pub fn new(name: impl Into<String>, pose: Pose, fade: &FadeConfig) -> Self {
        SceneItem {
            name: name.into(),
            pose,
            visible: false,
            fade: FadeController::new(fade),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fade_state(&self) -> FadePhase {
        self.fade.phase()
    }

    pub fn opacity(&self) -> f32 {
        self.fade.opacity()
    }

    pub fn fade(&self) -> &FadeController {
        &self.fade
    }

    pub fn is_fading(&self) -> bool {
        self.fade.phase() == FadePhase::FadingOut
    }

    pub fn start_fade_out(&mut self, now: SceneTime) {
        self.fade.start_fade_out(now);
    }

    /// Cancel any fade; reports a notice if one was running
    pub fn show(&mut self) -> Option<FadeNotice> {
        let end = self.fade.show()?;
        Some(self.notice(end))
    }

    /// Finish a running fade now (superseded by a new placement)
    pub fn force_complete(&mut self) -> Option<FadeNotice> {
        let end = self.fade.force_complete()?;
        Some(self.finish(end))
    }

    /// Run due fade ticks
    pub fn advance(&mut self, now: SceneTime) -> Option<FadeNotice> {
        let end = self.fade.advance(now)?;
        Some(self.finish(end))
    }

    pub fn snapshot(&self) -> ItemSnapshot {
        ItemSnapshot::new(self.name.clone(), self.pose, self.visible)
    }

    fn finish(&mut self, end: FadeEnd) -> FadeNotice {
        self.visible = false;
        self.notice(end)
    }

    fn notice(&self, end: FadeEnd) -> FadeNotice {
        FadeNotice {
            name: self.name.clone(),
            end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_commits_not_visible() {
        let mut item = SceneItem::new("chair", Pose::identity(), &FadeConfig::default());
        item.visible = true;
        item.start_fade_out(SceneTime::ZERO);

        let notice = item.advance(SceneTime::from_millis(5000)).unwrap();
        assert_eq!(notice.name, "chair");
        assert_eq!(notice.end, FadeEnd::Completed);
        assert!(!item.visible);
        assert_eq!(item.fade_state(), FadePhase::Completed);
        assert_eq!(item.opacity(), 1.0);
    }

    #[test]
    fn test_show_keeps_committed_visibility() {
        let mut item = SceneItem::new("chair", Pose::identity(), &FadeConfig::default());
        item.visible = true;
        item.start_fade_out(SceneTime::ZERO);

        let notice = item.show().unwrap();
        assert_eq!(notice.end, FadeEnd::Stopped);
        assert!(item.visible);
        assert!(item.show().is_none());
    }
}
