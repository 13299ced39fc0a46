use super::{CursorHeuristicPredictor, Predictor};
use crate::error::InferenceError;
use crate::models::prediction_types::{FrameContext, PredictionResult};
use crate::services::model_manager::ModelManager;
use crate::services::preprocessor::FrameBatch;

/// VL-JEPA encoder followed by an action head.
///
/// With a loaded session the frame batch is encoded first, so backend
/// failures surface as [`InferenceError`]. The pooled embedding is only
/// logged: the cursor head does not read it yet, so every request with a
/// loaded model pays one encoder pass for that check alone. Without a
/// session the predictor answers from the head alone (placeholder mode).
#[derive(Clone)]
pub struct VljepaPredictor {
    model: ModelManager,
    head: CursorHeuristicPredictor,
}

impl VljepaPredictor {
    pub fn new(model: ModelManager) -> Self {
        Self {
            model,
            head: CursorHeuristicPredictor::new(),
        }
    }

    pub fn model(&self) -> &ModelManager {
        &self.model
    }
}

impl Predictor for VljepaPredictor {
    fn predict(
        &self,
        batch: &FrameBatch,
        context: &FrameContext,
    ) -> Result<PredictionResult, InferenceError> {
        match self.model.encode(batch)? {
            Some(embedding) => {
                tracing::debug!(frames = batch.len(), dims = embedding.len(), "Encoded frame batch");
            }
            None => {
                tracing::debug!(frames = batch.len(), "No encoder loaded, using action head only");
            }
        }

        Ok(self.head.decide(context))
    }

    fn name(&self) -> &'static str {
        "vljepa"
    }
}
