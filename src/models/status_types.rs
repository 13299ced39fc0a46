use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ModelStatus {
    pub downloaded: bool,
    pub loading: bool,
    pub ready: bool,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: &'static str,
    pub device: String,
    pub gpu_available: bool,
    pub gpu_name: Option<String>,
    pub model: ModelStatus,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StartupStatus {
    pub status: &'static str,
    pub model_loaded: bool,
}

#[derive(Debug, Serialize, Clone)]
pub struct ReadyStatus {
    pub status: &'static str,
}

#[derive(Debug, Serialize, Clone)]
pub struct ServiceInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub endpoints: BTreeMap<&'static str, &'static str>,
}
