use crate::error::AppError;
use crate::models::prediction_types::{PredictionRequest, PredictionResult};
use crate::services::prediction_service::validate_frame_count;
use crate::AppState;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

pub const API_KEY_HEADER: &str = "x-api-key";

pub async fn predict(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<PredictionRequest>,
) -> Result<Json<PredictionResult>, AppError> {
    let provided = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
    if provided != Some(state.api_key.as_ref()) {
        tracing::warn!("Rejected prediction request with missing or invalid API key");
        return Err(AppError::unauthorized());
    }

    validate_frame_count(request.frames.len())?;

    tracing::info!(
        frames = request.frames.len(),
        cursor_x = request.context.cursor_x,
        cursor_y = request.context.cursor_y,
        timestamp = %request.timestamp,
        "Received prediction request"
    );

    // Decode, resize and inference are CPU/accelerator bound.
    let service = state.service.clone();
    let result = tokio::task::spawn_blocking(move || {
        service.process(&request.frames, &request.context)
    })
    .await??;

    Ok(Json(result))
}
