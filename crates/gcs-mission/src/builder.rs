use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use gcs_nav::LatLon;
use gcs_proto::{Capabilities, GeometryType};
use serde::Serialize;
use tracing::debug;

use crate::selection::GeometrySelection;

pub const DEFAULT_SETPOINT_ALT_M: f64 = 12.0;

/// Reasons a mission cannot be sent. The messages are meant for the operator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Select a mission first.")]
    NoMissionSelected,
    #[error("Mission config not found for `{0}`.")]
    UnknownMission(String),
    #[error("Mission `{name}` is locked until activated: {}", requires.join(", "))]
    MissionLocked { name: String, requires: Vec<String> },
    #[error("Click on the map to set a target point.")]
    MissingPoint,
    #[error("Draw a polygon with at least 3 vertices first.")]
    MissingPolygon,
    #[error("Draw a path with at least 2 vertices first.")]
    MissingPolyline,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Setpoint {
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemUpload {
    pub filename: String,
    /// File bytes, standard base64.
    pub data: String,
}

/// Body of `POST /run_mission`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissionPayload {
    #[serde(rename = "type")]
    pub mission_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setpoint: Option<Setpoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polygon: Option<Vec<LatLon>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polyline: Option<Vec<LatLon>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dem_upload: Option<DemUpload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dem: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_point_cloud: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct TerrainUpload {
    pub filename: String,
    pub content: Bytes,
}

/// Attachments that ride along with any mission type.
#[derive(Debug, Clone, Default)]
pub struct MissionExtras {
    pub dem_upload: Option<TerrainUpload>,
    /// Filename of a terrain model already catalogued on the vehicle.
    pub dem_name: Option<String>,
    pub capture_point_cloud: bool,
}

/// Validates operator geometry against a mission's declared needs. No I/O.
pub struct MissionPayloadBuilder<'a> {
    caps: &'a Capabilities,
    setpoint_alt_m: f64,
}

impl<'a> MissionPayloadBuilder<'a> {
    pub fn new(caps: &'a Capabilities) -> Self {
        Self { caps, setpoint_alt_m: DEFAULT_SETPOINT_ALT_M }
    }

    pub fn with_setpoint_alt(mut self, alt_m: f64) -> Self {
        self.setpoint_alt_m = alt_m;
        self
    }

    pub fn build(
        &self,
        mission: Option<&str>,
        selection: &GeometrySelection,
        extras: &MissionExtras,
    ) -> Result<MissionPayload, ValidationError> {
        let name = mission.map(str::trim).filter(|m| !m.is_empty()).ok_or(ValidationError::NoMissionSelected)?;
        let descriptor = self.caps.mission(name).ok_or_else(|| ValidationError::UnknownMission(name.to_string()))?;
        if !descriptor.available {
            return Err(ValidationError::MissionLocked {
                name: descriptor.name.clone(),
                requires: descriptor.requires_activation.iter().cloned().collect(),
            });
        }

        let mut payload = MissionPayload {
            mission_type: descriptor.name.clone(),
            setpoint: None,
            polygon: None,
            polyline: None,
            dem_upload: None,
            dem: None,
            capture_point_cloud: None,
        };

        match descriptor.geometry_type {
            GeometryType::Point => {
                let p = selection.point().ok_or(ValidationError::MissingPoint)?;
                payload.setpoint = Some(Setpoint { lat: p.lat, lon: p.lon, alt: self.setpoint_alt_m });
            }
            GeometryType::Polygon => {
                let ring = selection.polygon_ring().filter(|r| r.len() >= 3).ok_or(ValidationError::MissingPolygon)?;
                payload.polygon = Some(ring.to_vec());
            }
            GeometryType::Polyline => {
                let line = selection.polyline().filter(|l| l.len() >= 2).ok_or(ValidationError::MissingPolyline)?;
                payload.polyline = Some(line.to_vec());
            }
            GeometryType::None => {}
        }

        if let Some(upload) = &extras.dem_upload {
            payload.dem_upload = Some(DemUpload { filename: upload.filename.clone(), data: STANDARD.encode(&upload.content) });
        } else if let Some(dem) = extras.dem_name.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            payload.dem = Some(dem.to_string());
        }

        if self.caps.hardware.has_point_cloud_sensor() {
            payload.capture_point_cloud = Some(extras.capture_point_cloud);
        } else if extras.capture_point_cloud {
            debug!("mission: point cloud capture requested but no sensor declared; flag omitted");
        }

        Ok(payload)
    }
}
