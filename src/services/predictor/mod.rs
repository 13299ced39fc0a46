//! Inference boundary between the frame pipeline and whatever produces actions.

pub mod heuristic;
pub mod vljepa;

use crate::error::InferenceError;
use crate::models::prediction_types::{FrameContext, PredictionResult};
use crate::services::preprocessor::FrameBatch;

pub use heuristic::CursorHeuristicPredictor;
pub use vljepa::VljepaPredictor;

/// Turns a normalized frame batch plus screen context into a prediction.
///
/// Implementations are shared across concurrent requests and must not hold
/// per-request mutable state. The batch shape is validated before this is
/// called.
pub trait Predictor: Send + Sync {
    fn predict(
        &self,
        batch: &FrameBatch,
        context: &FrameContext,
    ) -> Result<PredictionResult, InferenceError>;

    /// Short identifier used in logs.
    fn name(&self) -> &'static str;
}
