use crate::error::{AppError, ErrorKind};
use crate::models::status_types::{HealthStatus, ReadyStatus, ServiceInfo, StartupStatus};
use crate::AppState;
use axum::extract::State;
use axum::Json;
use std::collections::BTreeMap;

pub const SERVICE_NAME: &str = "VL-JEPA Prediction Server";

pub async fn root() -> Json<ServiceInfo> {
    let endpoints = BTreeMap::from([
        ("/health", "Health check"),
        ("/startup", "Startup probe"),
        ("/ready", "Readiness probe"),
        ("/api/predict", "POST - Submit frames for prediction"),
    ]);
    Json(ServiceInfo {
        name: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        endpoints,
    })
}

pub async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "healthy",
        device: state.model.device.to_string(),
        gpu_available: state.model.cuda_available(),
        gpu_name: state.model.gpu_name(),
        model: state.model.status().await,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

pub async fn startup(State(state): State<AppState>) -> Json<StartupStatus> {
    Json(StartupStatus {
        status: "ready",
        model_loaded: state.model.is_ready(),
    })
}

/// Ready once the startup model load has finished, loaded or not.
pub async fn ready(State(state): State<AppState>) -> Result<Json<ReadyStatus>, AppError> {
    if !state.model.is_settled() {
        return Err(AppError::new(ErrorKind::Unavailable, "Model not loaded"));
    }
    Ok(Json(ReadyStatus { status: "ready" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::model_manager::{Device, ModelManager};
    use crate::services::prediction_service::PredictionService;
    use crate::services::predictor::CursorHeuristicPredictor;
    use axum::http::StatusCode;
    use std::sync::Arc;

    fn state(dir: &std::path::Path) -> AppState {
        AppState {
            service: Arc::new(PredictionService::new(Arc::new(CursorHeuristicPredictor), 0.8)),
            model: ModelManager::new(dir.join("model.onnx"), None, Device::Cpu),
            api_key: Arc::from("secret"),
            max_body_bytes: crate::config::DEFAULT_MAX_BODY_BYTES,
        }
    }

    #[tokio::test]
    async fn readiness_waits_for_model_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());

        let err = ready(State(state.clone())).await.unwrap_err();
        assert_eq!(err.kind.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        state.model.initialize().await;
        assert_eq!(ready(State(state.clone())).await.unwrap().status, "ready");

        let Json(probe) = startup(State(state)).await;
        assert!(!probe.model_loaded);
    }

    #[tokio::test]
    async fn health_reports_device_and_model() {
        let dir = tempfile::tempdir().unwrap();
        let Json(report) = health(State(state(dir.path()))).await;
        assert_eq!(report.status, "healthy");
        assert_eq!(report.device, "cpu");
        assert!(!report.model.ready);
        if !report.gpu_available {
            assert!(report.gpu_name.is_none());
        }
        assert!(chrono::DateTime::parse_from_rfc3339(&report.timestamp).is_ok());
    }

    #[tokio::test]
    async fn root_lists_prediction_endpoint() {
        let Json(info) = root().await;
        assert_eq!(info.name, SERVICE_NAME);
        assert!(info.endpoints.contains_key("/api/predict"));
    }
}
