//! Process configuration, read once from the environment at startup.

use crate::error::ConfigError;
use crate::services::model_manager::Device;
use std::path::PathBuf;

pub const DEFAULT_API_KEY: &str = "your-secure-api-key-here";
pub const DEFAULT_MODEL_PATH: &str = "./models/vljepa_vitl16.onnx";
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.80;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
/// Twenty base64 full-screen captures with room to spare.
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Expected `X-API-Key` header value.
    pub api_key: String,
    pub model_path: PathBuf,
    /// Downloaded to `model_path` at startup when the file is missing.
    pub model_url: Option<String>,
    pub device: Device,
    pub min_confidence: f32,
    pub host: String,
    pub port: u16,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_key: DEFAULT_API_KEY.to_string(),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            model_url: None,
            device: Device::Auto,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Unset keys keep their defaults;
    /// set but unparseable keys are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ServiceConfig::default();

        if let Some(val) = lookup("VLJEPA_API_KEY") {
            config.api_key = val;
        }
        if let Some(val) = lookup("VLJEPA_MODEL_PATH") {
            config.model_path = PathBuf::from(val);
        }
        if let Some(val) = lookup("VLJEPA_MODEL_URL") {
            if !val.trim().is_empty() {
                config.model_url = Some(val);
            }
        }
        if let Some(val) = lookup("VLJEPA_DEVICE") {
            config.device = val.parse().map_err(|reason| ConfigError::Invalid {
                key: "VLJEPA_DEVICE",
                value: val.clone(),
                reason,
            })?;
        }
        if let Some(val) = lookup("MIN_CONFIDENCE") {
            let parsed: f32 = val.trim().parse().map_err(|e: std::num::ParseFloatError| {
                ConfigError::Invalid {
                    key: "MIN_CONFIDENCE",
                    value: val.clone(),
                    reason: e.to_string(),
                }
            })?;
            if !(0.0..=1.0).contains(&parsed) {
                return Err(ConfigError::Invalid {
                    key: "MIN_CONFIDENCE",
                    value: val,
                    reason: "must be within [0, 1]".to_string(),
                });
            }
            config.min_confidence = parsed;
        }
        if let Some(val) = lookup("HOST") {
            config.host = val;
        }
        if let Some(val) = lookup("PORT") {
            config.port = val.trim().parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::Invalid {
                    key: "PORT",
                    value: val.clone(),
                    reason: e.to_string(),
                }
            })?;
        }

        if let Some(val) = lookup("MAX_BODY_BYTES") {
            config.max_body_bytes = val.trim().parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::Invalid {
                    key: "MAX_BODY_BYTES",
                    value: val.clone(),
                    reason: e.to_string(),
                }
            })?;
        }

        Ok(config)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
