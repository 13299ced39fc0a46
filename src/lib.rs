pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use config::ServiceConfig;
use services::model_manager::ModelManager;
use services::prediction_service::PredictionService;
use services::predictor::VljepaPredictor;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Shared handler state. Everything in it is read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PredictionService>,
    pub model: ModelManager,
    pub api_key: Arc<str>,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn from_config(config: &ServiceConfig) -> Self {
        let model = ModelManager::new(
            config.model_path.clone(),
            config.model_url.clone(),
            config.device,
        );
        let predictor = Arc::new(VljepaPredictor::new(model.clone()));
        Self {
            service: Arc::new(PredictionService::new(predictor, config.min_confidence)),
            model,
            api_key: Arc::from(config.api_key.as_str()),
            max_body_bytes: config.max_body_bytes,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.max_body_bytes);
    Router::new()
        .route("/", get(commands::status::root))
        .route("/health", get(commands::status::health))
        .route("/startup", get(commands::status::startup))
        .route("/ready", get(commands::status::ready))
        .route("/api/predict", post(commands::predict::predict))
        .layer(body_limit)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Starts the model load in the background and serves until ctrl-c.
pub async fn run(config: ServiceConfig) -> std::io::Result<()> {
    let state = AppState::from_config(&config);

    tracing::info!(
        device = %config.device,
        model = %config.model_path.display(),
        min_confidence = state.service.min_confidence(),
        predictor = state.service.predictor_name(),
        "Starting VL-JEPA server"
    );

    let model = state.model.clone();
    tokio::spawn(async move {
        model.initialize().await;
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    tracing::info!(addr = %config.bind_addr(), "Listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down VL-JEPA server...");
        })
        .await
}
