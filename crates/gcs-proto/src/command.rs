use serde::{Deserialize, Serialize};

/// Operator position report posted to `/remote_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteIdReport {
    pub ts_unix_ms: i64,
    pub lat: f64,
    pub lon: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_m: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hdop: Option<f32>,
}

/// Body of `POST /set_module_active`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleToggle {
    pub module_name: String,
    pub active: bool,
}

/// Optional confirmation returned by `POST /run_mission`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MissionAck {
    #[serde(default)]
    pub status: Option<String>,
}
