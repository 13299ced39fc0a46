use crate::error::{InferenceError, PipelineError};
use crate::models::prediction_types::{FrameContext, PredictionResult};
use crate::services::frame_decoder::{self, RawFrame};
use crate::services::gate::ConfidenceGate;
use crate::services::predictor::Predictor;
use crate::services::preprocessor::{self, MAX_FRAMES};
use std::sync::Arc;

/// Runs decode, preprocess, predict and gate for one request.
///
/// Holds no per-request state; one instance is built at startup and shared.
#[derive(Clone)]
pub struct PredictionService {
    predictor: Arc<dyn Predictor>,
    gate: ConfidenceGate,
}

impl PredictionService {
    pub fn new(predictor: Arc<dyn Predictor>, min_confidence: f32) -> Self {
        Self {
            predictor,
            gate: ConfidenceGate::new(min_confidence),
        }
    }

    pub fn predictor_name(&self) -> &'static str {
        self.predictor.name()
    }

    pub fn min_confidence(&self) -> f32 {
        self.gate.threshold
    }

    pub fn process(
        &self,
        frames: &[String],
        context: &FrameContext,
    ) -> Result<PredictionResult, PipelineError> {
        self.process_with_threshold(frames, context, self.gate.threshold)
    }

    pub fn process_with_threshold(
        &self,
        frames: &[String],
        context: &FrameContext,
        threshold: f32,
    ) -> Result<PredictionResult, PipelineError> {
        validate_frame_count(frames.len())?;
        validate_context(context)?;

        let decoded = frames
            .iter()
            .enumerate()
            .map(|(index, payload)| {
                frame_decoder::decode(payload).map_err(|source| PipelineError::Decode { index, source })
            })
            .collect::<Result<Vec<RawFrame>, _>>()?;

        let batch = preprocessor::preprocess(&decoded)?;
        tracing::info!(frames = batch.len(), shape = ?batch.shape(), "Preprocessed frames");

        let result = self.predictor.predict(&batch, context)?;
        if !(0.0..=1.0).contains(&result.confidence) {
            return Err(InferenceError::InvalidConfidence(result.confidence).into());
        }

        if result.confidence < threshold {
            tracing::info!(confidence = result.confidence, threshold, "Prediction below threshold");
        } else {
            tracing::info!(
                description = %result.description,
                confidence = result.confidence,
                predictor = self.predictor.name(),
                "Prediction"
            );
        }

        Ok(ConfidenceGate::new(threshold).apply(result))
    }
}

/// Accepts 1..=20 frames.
pub fn validate_frame_count(count: usize) -> Result<(), PipelineError> {
    match count {
        0 => Err(PipelineError::NoFrames),
        n if n > MAX_FRAMES => Err(PipelineError::TooManyFrames {
            count: n,
            max: MAX_FRAMES,
        }),
        _ => Ok(()),
    }
}

fn validate_context(context: &FrameContext) -> Result<(), PipelineError> {
    if context.monitor_width <= 0 || context.monitor_height <= 0 {
        return Err(PipelineError::InvalidContext(format!(
            "monitor size must be positive, got {}x{}",
            context.monitor_width, context.monitor_height
        )));
    }
    Ok(())
}
