use crate::models::prediction_types::PredictionResult;

/// Description carried by a gated result.
pub const NO_PREDICTION_DESCRIPTION: &str = "No confident prediction";

/// Suppresses the actions of predictions below a minimum confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceGate {
    pub threshold: f32,
}

impl ConfidenceGate {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn apply(&self, result: PredictionResult) -> PredictionResult {
        gate(result, self.threshold)
    }
}

/// Keeps `result` when `confidence >= threshold`; otherwise returns the same
/// confidence with the sentinel description and no actions.
pub fn gate(result: PredictionResult, threshold: f32) -> PredictionResult {
    if result.confidence < threshold {
        PredictionResult {
            confidence: result.confidence,
            description: NO_PREDICTION_DESCRIPTION.to_string(),
            actions: Vec::new(),
        }
    } else {
        result
    }
}
