use super::Predictor;
use crate::error::InferenceError;
use crate::models::prediction_types::{ActionRegion, FrameContext, PredictedAction, PredictionResult};
use crate::services::preprocessor::FrameBatch;

/// Fixed confidence reported by the cursor rule.
pub const HEURISTIC_CONFIDENCE: f32 = 0.85;

/// Cursor rows within this many pixels of the bottom edge count as taskbar.
pub const TASKBAR_BAND: i32 = 150;
/// Cursor rows above this count as menu/toolbar.
pub const MENU_BAND: i32 = 100;

pub const TASKBAR_BOX: (u32, u32) = (40, 40);
pub const MENU_BOX: (u32, u32) = (80, 30);
pub const ELEMENT_BOX: (u32, u32) = (100, 30);
/// Menu and element boxes have their top edge this far above the cursor.
pub const BOX_RISE: i32 = 15;

/// Predicts a single click from where the cursor sits on the monitor.
///
/// Ignores pixel content entirely; stands in for a trained action head.
#[derive(Debug, Clone, Copy, Default)]
pub struct CursorHeuristicPredictor;

impl CursorHeuristicPredictor {
    pub fn new() -> Self {
        CursorHeuristicPredictor
    }

    pub fn decide(&self, context: &FrameContext) -> PredictionResult {
        let (cx, cy) = (context.cursor_x, context.cursor_y);

        let (description, target, region) = if cy > context.monitor_height.saturating_sub(TASKBAR_BAND) {
            let (w, h) = TASKBAR_BOX;
            (
                "Open application from taskbar",
                "Taskbar item",
                ActionRegion::around(cx, cy, w, h, (h / 2) as i32),
            )
        } else if cy < MENU_BAND {
            let (w, h) = MENU_BOX;
            (
                "Click menu or toolbar button",
                "Menu button",
                ActionRegion::around(cx, cy, w, h, BOX_RISE),
            )
        } else {
            let (w, h) = ELEMENT_BOX;
            (
                "Click on UI element",
                "UI element",
                ActionRegion::around(cx, cy, w, h, BOX_RISE),
            )
        };

        PredictionResult {
            confidence: HEURISTIC_CONFIDENCE,
            description: description.to_string(),
            actions: vec![PredictedAction::Click {
                target: target.to_string(),
                region,
            }],
        }
    }
}

impl Predictor for CursorHeuristicPredictor {
    fn predict(
        &self,
        _batch: &FrameBatch,
        context: &FrameContext,
    ) -> Result<PredictionResult, InferenceError> {
        Ok(self.decide(context))
    }

    fn name(&self) -> &'static str {
        "cursor-heuristic"
    }
}
