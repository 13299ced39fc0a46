use serde::{Deserialize, Serialize};

/// Monitor geometry and cursor position captured alongside the frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameContext {
    pub monitor_width: i32,
    pub monitor_height: i32,
    pub cursor_x: i32,
    pub cursor_y: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PredictionRequest {
    /// Base64-encoded images, oldest first.
    pub frames: Vec<String>,
    pub timestamp: String,
    pub context: FrameContext,
}

/// Screen rectangle where a pointer action should land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRegion {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl ActionRegion {
    /// Box horizontally centered on `cx` with its top edge `rise` pixels above `cy`.
    pub fn around(cx: i32, cy: i32, width: u32, height: u32, rise: i32) -> Self {
        ActionRegion {
            x: cx.saturating_sub((width / 2) as i32),
            y: cy.saturating_sub(rise),
            width,
            height,
        }
    }

    pub fn center(&self) -> (i64, i64) {
        (
            self.x as i64 + self.width as i64 / 2,
            self.y as i64 + self.height as i64 / 2,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

/// One step the user is expected to take next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum PredictedAction {
    Click {
        target: String,
        region: ActionRegion,
    },
    RightClick {
        target: String,
        region: ActionRegion,
    },
    DoubleClick {
        target: String,
        region: ActionRegion,
    },
    Type {
        target: String,
        text: String,
    },
    Key {
        target: String,
        keys: String,
    },
    Drag {
        target: String,
        region: ActionRegion,
        end_x: i32,
        end_y: i32,
    },
    Scroll {
        target: String,
        direction: ScrollDirection,
        amount: i32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        region: Option<ActionRegion>,
    },
}

impl PredictedAction {
    pub fn target(&self) -> &str {
        match self {
            PredictedAction::Click { target, .. }
            | PredictedAction::RightClick { target, .. }
            | PredictedAction::DoubleClick { target, .. }
            | PredictedAction::Type { target, .. }
            | PredictedAction::Key { target, .. }
            | PredictedAction::Drag { target, .. }
            | PredictedAction::Scroll { target, .. } => target,
        }
    }

    pub fn region(&self) -> Option<&ActionRegion> {
        match self {
            PredictedAction::Click { region, .. }
            | PredictedAction::RightClick { region, .. }
            | PredictedAction::DoubleClick { region, .. }
            | PredictedAction::Drag { region, .. } => Some(region),
            PredictedAction::Scroll { region, .. } => region.as_ref(),
            PredictedAction::Type { .. } | PredictedAction::Key { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub confidence: f32,
    pub description: String,
    pub actions: Vec<PredictedAction>,
}
