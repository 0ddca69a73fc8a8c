use gcs_nav::{Color, DepthColorMapper, LatLon};
use gcs_proto::Telemetry;
use tokio::time::Instant;
use tracing::debug;

use crate::status::{classify, is_airborne, StatusCategory};

pub const GPS_FIXED_MIN_SATS: u32 = 10;
pub const BATTERY_LOW_V: f64 = 10.5;

/// Last-known vehicle state as derived from telemetry.
#[derive(Debug, Clone)]
pub struct VehicleState {
    pub position: Option<LatLon>,
    pub heading: f64,
    pub status: String,
    pub status_category: StatusCategory,
    pub in_flight: bool,
    pub connected: bool,
    pub last_update: Option<Instant>,

    pub gps_satellites: u32,
    pub num_cameras: u32,
    pub battery_voltage: f64,
    pub height: f64,
    pub distance: f64,
    pub speed: f64,
    pub depth: Option<f64>,
    pub depth_color: Option<Color>,
}

impl Default for VehicleState {
    fn default() -> Self {
        Self {
            position: None,
            heading: 0.0,
            status: "--".to_string(),
            status_category: StatusCategory::Alarm,
            in_flight: false,
            connected: false,
            last_update: None,
            gps_satellites: 0,
            num_cameras: 0,
            battery_voltage: 0.0,
            height: 0.0,
            distance: 0.0,
            speed: 0.0,
            depth: None,
            depth_color: None,
        }
    }
}

impl VehicleState {
    pub fn gps_fixed(&self) -> bool {
        self.gps_satellites >= GPS_FIXED_MIN_SATS
    }

    pub fn battery_low(&self) -> bool {
        self.last_update.is_some() && self.battery_voltage < BATTERY_LOW_V
    }
}

/// Sole writer of [`VehicleState`].
#[derive(Debug, Clone, Default)]
pub struct VehicleStateModel {
    state: VehicleState,
    depth_colors: DepthColorMapper,
}

impl VehicleStateModel {
    pub fn new(depth_colors: DepthColorMapper) -> Self {
        Self { state: VehicleState::default(), depth_colors }
    }

    pub fn state(&self) -> &VehicleState {
        &self.state
    }

    pub fn apply(&mut self, t: &Telemetry, now: Instant) {
        let s = &mut self.state;
        if !s.connected {
            debug!("vehicle: telemetry resumed (status={})", t.status);
        }
        s.position = Some(LatLon::new(t.lat, t.lon));
        s.heading = t.heading;
        s.status = t.status.clone();
        s.status_category = classify(&t.status);
        s.in_flight = is_airborne(&t.status);
        s.connected = true;
        s.last_update = Some(now);

        s.gps_satellites = t.gps_satellites;
        s.num_cameras = t.num_cameras;
        s.battery_voltage = t.battery_voltage;
        s.height = t.height;
        s.distance = t.distance;
        s.speed = t.speed;
        s.depth = t.depth;
        s.depth_color = Some(self.depth_colors.color_for(t.depth.unwrap_or(t.height)));
    }

    /// Data feed went quiet; everything else stays last-known-good.
    pub fn mark_stale(&mut self) {
        self.state.connected = false;
    }

    /// Link closed or failed. Position and status stay on display, but nothing
    /// counts as a current reading until telemetry arrives on a new channel.
    pub fn mark_disconnected(&mut self) {
        self.state.connected = false;
        self.state.last_update = None;
    }
}
