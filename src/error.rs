use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// How a failure is reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself is at fault. Never retried by the service.
    BadInput,
    /// Missing or incorrect credential.
    Unauthorized,
    /// Something went wrong on our side. Details stay in the logs.
    Internal,
    /// The service is not ready to take traffic yet.
    Unavailable,
}

impl ErrorKind {
    pub fn status_code(self) -> StatusCode {
        match self {
            ErrorKind::BadInput => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Failure to turn one encoded frame into pixels.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("malformed encoding: {0}")]
    MalformedEncoding(String),

    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("truncated or corrupt image data: {0}")]
    TruncatedData(String),
}

impl From<base64::DecodeError> for DecodeError {
    fn from(err: base64::DecodeError) -> Self {
        DecodeError::MalformedEncoding(err.to_string())
    }
}

impl From<image::ImageError> for DecodeError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Unsupported(e) => DecodeError::UnsupportedFormat(e.to_string()),
            image::ImageError::Limits(e) => DecodeError::UnsupportedFormat(e.to_string()),
            other => DecodeError::TruncatedData(other.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("no frames to preprocess")]
    EmptyBatch,

    #[error("frame {index} has zero width or height")]
    EmptyFrame { index: usize },

    #[error("unsupported channel count {channels}")]
    UnsupportedChannels { channels: usize },

    #[error("pixel buffer holds {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },

    #[error("tensor assembly")]
    Shape(#[from] ndarray::ShapeError),
}

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error(transparent)]
    Session(#[from] ort::Error),

    #[error("model output: {0}")]
    Output(String),

    #[error("predictor returned confidence {0} outside [0, 1]")]
    InvalidConfidence(f32),
}

/// Any failure of one pass through the prediction pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("No frames provided")]
    NoFrames,

    #[error("Too many frames (max {max}, got {count})")]
    TooManyFrames { count: usize, max: usize },

    #[error("Invalid context: {0}")]
    InvalidContext(String),

    #[error("Invalid frame data at index {index}: {source}")]
    Decode {
        index: usize,
        #[source]
        source: DecodeError,
    },

    #[error("preprocessing failed: {0}")]
    Preprocess(#[from] PreprocessError),

    #[error("inference failed: {0}")]
    Inference(#[from] InferenceError),
}

impl PipelineError {
    /// The one place pipeline failures are sorted into caller-facing kinds.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::NoFrames
            | PipelineError::TooManyFrames { .. }
            | PipelineError::InvalidContext(_)
            | PipelineError::Decode { .. } => ErrorKind::BadInput,
            PipelineError::Preprocess(e) => match e {
                PreprocessError::EmptyFrame { .. } | PreprocessError::UnsupportedChannels { .. } => {
                    ErrorKind::BadInput
                }
                PreprocessError::EmptyBatch
                | PreprocessError::BufferSize { .. }
                | PreprocessError::Shape(_) => ErrorKind::Internal,
            },
            PipelineError::Inference(_) => ErrorKind::Internal,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{key}: cannot parse {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Error returned across the HTTP boundary.
#[derive(Debug, Serialize)]
pub struct AppError {
    #[serde(skip)]
    pub kind: ErrorKind,
    #[serde(rename = "detail")]
    pub message: String,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        AppError {
            kind,
            message: message.into(),
        }
    }

    pub fn unauthorized() -> Self {
        AppError::new(ErrorKind::Unauthorized, "Invalid API key")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        AppError::new(ErrorKind::Internal, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err.kind() {
            ErrorKind::Internal => {
                tracing::error!(error = %err, source = ?std::error::Error::source(&err), "Prediction failed");
                AppError::internal("Prediction failed")
            }
            kind => AppError::new(kind, err.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        tracing::error!(error = %err, "Prediction task did not complete");
        AppError::internal("Prediction failed")
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::internal(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::internal(msg)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.kind.status_code(), Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_faults_are_bad_input() {
        assert_eq!(PipelineError::NoFrames.kind(), ErrorKind::BadInput);
        assert_eq!(
            PipelineError::TooManyFrames { count: 21, max: 20 }.kind(),
            ErrorKind::BadInput
        );
        let decode = PipelineError::Decode {
            index: 2,
            source: DecodeError::MalformedEncoding("bad".into()),
        };
        assert_eq!(decode.kind(), ErrorKind::BadInput);
        assert!(decode.to_string().contains("index 2"));
    }

    #[test]
    fn internal_errors_are_opaque_at_the_boundary() {
        let err = PipelineError::Inference(InferenceError::Output("tensor was empty".into()));
        assert_eq!(err.kind(), ErrorKind::Internal);

        let app: AppError = err.into();
        assert_eq!(app.kind, ErrorKind::Internal);
        assert_eq!(app.message, "Prediction failed");
        assert_eq!(app.kind.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn unsupported_image_maps_to_unsupported_format() {
        let err = image::load_from_memory(b"definitely not an image").unwrap_err();
        assert!(matches!(DecodeError::from(err), DecodeError::UnsupportedFormat(_)));
    }

    #[test]
    fn app_error_serializes_as_detail() {
        let json = serde_json::to_value(AppError::unauthorized()).unwrap();
        assert_eq!(json, serde_json::json!({ "detail": "Invalid API key" }));
    }
}
