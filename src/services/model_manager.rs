use crate::error::{AppError, InferenceError};
use crate::models::status_types::ModelStatus;
use crate::services::preprocessor::FrameBatch;
use futures::StreamExt;
use ort::execution_providers::ExecutionProvider;
use ort::session::Session;
use ort::value::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Where inference should run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Device {
    /// CUDA when the provider is available, CPU otherwise.
    Auto,
    Cpu,
    Cuda,
}

impl FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Device::Auto),
            "cpu" => Ok(Device::Cpu),
            "cuda" | "gpu" => Ok(Device::Cuda),
            other => Err(format!("unknown device {other:?}, expected auto, cpu or cuda")),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Auto => write!(f, "auto"),
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda => write!(f, "cuda"),
        }
    }
}

/// Owns the encoder artifact and its ONNX Runtime session.
///
/// The session is written once by [`ModelManager::load_model`] and afterwards
/// only read. Runs go through the mutex so a single accelerator is never
/// driven by two requests at once.
#[derive(Clone)]
pub struct ModelManager {
    pub model_path: PathBuf,
    pub model_url: Option<String>,
    pub device: Device,
    session: Arc<std::sync::Mutex<Option<Session>>>,
    loaded: Arc<AtomicBool>,
    loading: Arc<Mutex<bool>>,
    error: Arc<Mutex<Option<String>>>,
    settled: Arc<AtomicBool>,
}

impl ModelManager {
    pub fn new(model_path: PathBuf, model_url: Option<String>, device: Device) -> Self {
        Self {
            model_path,
            model_url,
            device,
            session: Arc::new(std::sync::Mutex::new(None)),
            loaded: Arc::new(AtomicBool::new(false)),
            loading: Arc::new(Mutex::new(false)),
            error: Arc::new(Mutex::new(None)),
            settled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_downloaded(&self) -> bool {
        self.model_path.exists()
    }

    /// Never touches the session lock, which is held for a whole inference run.
    pub fn is_ready(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// True once the startup load attempt has finished, successfully or not.
    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }

    pub async fn is_loading(&self) -> bool {
        *self.loading.lock().await
    }

    pub async fn get_error(&self) -> Option<String> {
        self.error.lock().await.clone()
    }

    pub async fn status(&self) -> ModelStatus {
        ModelStatus {
            downloaded: self.is_downloaded(),
            loading: self.is_loading().await,
            ready: self.is_ready(),
            error: self.get_error().await,
        }
    }

    pub fn cuda_available(&self) -> bool {
        ort::execution_providers::CUDAExecutionProvider::default()
            .is_available()
            .unwrap_or(false)
    }

    /// Name of the first NVIDIA GPU as reported by the kernel driver.
    pub fn gpu_name(&self) -> Option<String> {
        if !self.cuda_available() {
            return None;
        }
        let entries = std::fs::read_dir(NVIDIA_GPU_INFO_DIR).ok()?;
        let mut dirs: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
        dirs.sort();
        dirs.iter()
            .filter_map(|dir| std::fs::read_to_string(dir.join("information")).ok())
            .find_map(|info| parse_gpu_model(&info))
    }

    /// Fetches the model from `model_url` unless the file is already present.
    pub async fn download_model(&self) -> Result<(), AppError> {
        if self.is_downloaded() {
            return Ok(());
        }

        let url = self.model_url.as_deref().ok_or_else(|| {
            AppError::from(format!(
                "Model not found at {} and no download URL configured",
                self.model_path.display()
            ))
        })?;

        if let Some(parent) = self.model_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                AppError::from(format!("Failed to create model directory: {}", e))
            })?;
        }

        download_file(url, &self.model_path).await
    }

    /// Startup sequence: download if needed, then load. Failures are recorded
    /// and leave the service answering in placeholder mode.
    pub async fn initialize(&self) {
        let mut result = Ok(());
        if !self.is_downloaded() && self.model_url.is_some() {
            *self.loading.lock().await = true;
            result = self.download_model().await;
            *self.loading.lock().await = false;
        }
        if result.is_ok() {
            result = self.load_model().await;
        }

        match result {
            Ok(()) => tracing::info!(path = %self.model_path.display(), device = %self.device, "Encoder model loaded"),
            Err(e) => {
                *self.error.lock().await = Some(e.message.clone());
                tracing::warn!(error = %e, "Model loading failed. Running in placeholder mode.");
            }
        }
        self.settled.store(true, Ordering::Release);
    }

    pub async fn load_model(&self) -> Result<(), AppError> {
        if self.is_ready() {
            return Ok(());
        }

        {
            let mut loading = self.loading.lock().await;
            if *loading {
                return Err("Model is already loading".into());
            }
            *loading = true;
        }

        *self.error.lock().await = None;

        let result = self.do_load_model().await;

        *self.loading.lock().await = false;

        if let Err(ref e) = result {
            *self.error.lock().await = Some(e.message.clone());
        }

        result
    }

    async fn do_load_model(&self) -> Result<(), AppError> {
        if !self.is_downloaded() {
            return Err(format!("Model file not found: {}", self.model_path.display()).into());
        }

        tracing::info!(path = %self.model_path.display(), device = %self.device, "Loading encoder model");

        let model_path = self.model_path.clone();
        let use_cuda = match self.device {
            Device::Cpu => false,
            Device::Cuda => true,
            Device::Auto => self.cuda_available(),
        };

        let session = tokio::task::spawn_blocking(move || -> Result<Session, AppError> {
            let _ = ort::init().with_name("vljepa-server").commit();

            let mut builder = Session::builder()
                .map_err(|e| AppError::from(format!("Failed to create session builder: {}", e)))?
                .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)
                .map_err(|e| AppError::from(format!("Failed to set optimization level: {}", e)))?
                .with_intra_threads(4)
                .map_err(|e| AppError::from(format!("Failed to set intra threads: {}", e)))?;

            if use_cuda {
                builder = builder
                    .with_execution_providers([
                        ort::execution_providers::CUDAExecutionProvider::default().build(),
                        ort::execution_providers::CPUExecutionProvider::default().build(),
                    ])
                    .map_err(|e| AppError::from(format!("Failed to register CUDA execution provider: {}", e)))?;
            } else {
                builder = builder
                    .with_execution_providers([
                        ort::execution_providers::CPUExecutionProvider::default().build(),
                    ])
                    .map_err(|e| AppError::from(format!("Failed to register CPU execution provider: {}", e)))?;
            }

            builder
                .commit_from_file(model_path)
                .map_err(|e| AppError::from(format!("Failed to load ONNX model: {}", e)))
        })
        .await
        .map_err(|e| AppError::from(format!("Failed to spawn model loading task: {}", e)))??;

        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(session);
        self.loaded.store(true, Ordering::Release);

        Ok(())
    }

    /// Runs the batch through the encoder and returns a mean-pooled,
    /// L2-normalized embedding. `None` when no model is loaded.
    pub fn encode(&self, batch: &FrameBatch) -> Result<Option<Vec<f32>>, InferenceError> {
        let mut guard = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(session) = guard.as_mut() else {
            return Ok(None);
        };

        let input_name = session
            .inputs()
            .first()
            .map(|input| input.name().to_string())
            .ok_or_else(|| InferenceError::Output("model declares no inputs".to_string()))?;

        let input_tensor = Value::from_array(batch.tensor().clone())?;
        let outputs = session.run(ort::inputs![input_name.as_str() => input_tensor])?;

        let output_value = outputs
            .values()
            .next()
            .ok_or_else(|| InferenceError::Output("model produced no outputs".to_string()))?;

        let (shape, data) = output_value.try_extract_tensor::<f32>()?;
        let dims = shape.iter().last().copied().unwrap_or(0).max(0) as usize;
        if dims == 0 || data.is_empty() || data.len() % dims != 0 {
            return Err(InferenceError::Output(format!(
                "cannot pool output of shape {:?}",
                shape.iter().collect::<Vec<_>>()
            )));
        }

        Ok(Some(mean_pool_normalized(data, dims)))
    }
}

/// Averages rows of width `dims`, then scales the result to unit length.
fn mean_pool_normalized(data: &[f32], dims: usize) -> Vec<f32> {
    let rows = data.len() / dims;
    let mut pooled = vec![0f32; dims];
    for row in data.chunks_exact(dims) {
        for (acc, v) in pooled.iter_mut().zip(row) {
            *acc += v;
        }
    }
    for v in &mut pooled {
        *v /= rows as f32;
    }

    let l2_norm = pooled.iter().map(|x| x * x).sum::<f32>().sqrt();
    if l2_norm > 0.0 {
        pooled.iter_mut().for_each(|x| *x /= l2_norm);
    }
    pooled
}

const NVIDIA_GPU_INFO_DIR: &str = "/proc/driver/nvidia/gpus";

/// Pulls the `Model:` value out of an NVIDIA driver `information` file.
fn parse_gpu_model(info: &str) -> Option<String> {
    info.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        let value = value.trim();
        (key.trim() == "Model" && !value.is_empty()).then(|| value.to_string())
    })
}

/// Streams `url` into `<dest>.part` and renames it into place. The partial
/// file never outlives a failed download.
async fn download_file(url: &str, dest: &Path) -> Result<(), AppError> {
    let client = reqwest::Client::new();
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(format!("Failed to download {}: HTTP {}", url, response.status()).into());
    }

    let partial = dest.with_extension("part");
    let result = match write_partial(response, &partial).await {
        Ok(bytes) => tokio::fs::rename(&partial, dest)
            .await
            .map(|()| bytes)
            .map_err(|e| AppError::from(format!("Failed to move model into place: {}", e))),
        Err(e) => Err(e),
    };

    match result {
        Ok(bytes) => {
            tracing::info!(bytes, path = %dest.display(), "Model downloaded");
            Ok(())
        }
        Err(e) => {
            if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %partial.display(), error = %cleanup, "Could not remove partial download");
                }
            }
            Err(e)
        }
    }
}

async fn write_partial(response: reqwest::Response, partial: &Path) -> Result<u64, AppError> {
    let total_size = response.content_length().unwrap_or(0);
    let mut downloaded: u64 = 0;

    let mut file = tokio::fs::File::create(partial).await.map_err(|e| {
        AppError::from(format!("Failed to create file {}: {}", partial.display(), e))
    })?;

    let mut stream = response.bytes_stream();
    let mut last_logged = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        downloaded += chunk.len() as u64;
        file.write_all(&chunk)
            .await
            .map_err(|e| AppError::from(format!("Failed to write to file: {}", e)))?;

        if total_size > 0 {
            let progress = (downloaded * 100) / total_size;
            if progress >= last_logged + 10 {
                tracing::info!(progress, "Downloading model");
                last_logged = progress;
            }
        }
    }
    file.flush()
        .await
        .map_err(|e| AppError::from(format!("Failed to flush file: {}", e)))?;

    Ok(downloaded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_parses_case_insensitively() {
        assert_eq!("CUDA".parse::<Device>().unwrap(), Device::Cuda);
        assert_eq!(" cpu ".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("auto".parse::<Device>().unwrap(), Device::Auto);
        assert!("tpu".parse::<Device>().is_err());
    }

    #[test]
    fn pooled_embedding_has_unit_length() {
        let data = [1.0, 0.0, 3.0, 4.0];
        let pooled = mean_pool_normalized(&data, 2);
        // mean rows: [2, 2] -> normalized to [1/sqrt2, 1/sqrt2]
        assert!((pooled[0] - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
        assert!((pooled[1] - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn unloaded_manager_encodes_nothing() {
        let manager = ModelManager::new(PathBuf::from("/nonexistent/model.onnx"), None, Device::Cpu);
        assert!(!manager.is_ready());
        let frames = vec![crate::services::frame_decoder::RawFrame::from_pixels(2, 2, 3, vec![0; 12]).unwrap()];
        let batch = crate::services::preprocessor::preprocess(&frames).unwrap();
        assert!(manager.encode(&batch).unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_model_settles_into_placeholder_mode() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ModelManager::new(dir.path().join("absent.onnx"), None, Device::Cpu);
        assert!(!manager.is_settled());

        manager.initialize().await;

        assert!(manager.is_settled());
        assert!(!manager.is_ready());
        let status = manager.status().await;
        assert!(!status.downloaded);
        assert!(!status.loading);
        assert!(status.error.unwrap().contains("absent.onnx"));
    }

    #[test]
    fn readiness_does_not_wait_on_a_running_session() {
        let manager = ModelManager::new(PathBuf::from("/nonexistent/model.onnx"), None, Device::Cpu);
        // Held for the duration of an inference run.
        let _running = manager.session.lock().unwrap();
        assert!(!manager.is_ready());
    }

    #[test]
    fn gpu_model_is_read_from_driver_info() {
        let info = "Model: \t\t NVIDIA L4\nIRQ: \t\t 42\nBus Type: \t PCIe\n";
        assert_eq!(parse_gpu_model(info).as_deref(), Some("NVIDIA L4"));
        assert_eq!(parse_gpu_model("IRQ: 42\nModel:   \n"), None);
    }

    async fn serve(app: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn download_reports_loading_until_it_finishes() {
        let release = Arc::new(tokio::sync::Notify::new());
        let gate = release.clone();
        let app = axum::Router::new().route(
            "/model.onnx",
            axum::routing::get(move || {
                let gate = gate.clone();
                async move {
                    gate.notified().await;
                    axum::http::StatusCode::NOT_FOUND
                }
            }),
        );
        let base = serve(app).await;

        let dir = tempfile::tempdir().unwrap();
        let manager = ModelManager::new(
            dir.path().join("model.onnx"),
            Some(format!("{base}/model.onnx")),
            Device::Cpu,
        );
        let task = tokio::spawn({
            let manager = manager.clone();
            async move { manager.initialize().await }
        });

        let mut seen_loading = false;
        for _ in 0..10_000 {
            if manager.is_loading().await {
                seen_loading = true;
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(seen_loading);

        release.notify_one();
        task.await.unwrap();

        let status = manager.status().await;
        assert!(!status.loading);
        assert!(!status.downloaded);
        assert!(status.error.unwrap().contains("404"));
    }

    #[tokio::test]
    async fn failed_download_leaves_no_partial_file() {
        let app = axum::Router::new().route(
            "/model.onnx",
            axum::routing::get(|| async { vec![7u8; 4096] }),
        );
        let base = serve(app).await;

        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory in the way makes the final rename fail.
        let dest = dir.path().join("model.onnx");
        std::fs::create_dir(&dest).unwrap();
        std::fs::write(dest.join("keep"), b"x").unwrap();

        let err = download_file(&format!("{base}/model.onnx"), &dest).await.unwrap_err();
        assert!(err.message.contains("move model into place"));
        assert!(!dest.with_extension("part").exists());
    }
}
