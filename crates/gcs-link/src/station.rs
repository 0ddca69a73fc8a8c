//! The ground-station session object: one owner for the telemetry channel,
//! the derived vehicle state, the mission path and the operator log.

use gcs_mission::{GeometrySelection, MissionExtras, MissionPayloadBuilder, ValidationError, DEFAULT_SETPOINT_ALT_M};
use gcs_nav::path::DEFAULT_MIN_SEPARATION_M;
use gcs_nav::{DepthColorMapper, MissionPathTracker};
use gcs_proto::{Capabilities, DemEntry, LogLevel, MissionAck, TelemetryMessage};
use gcs_vehicle::status::is_complete;
use gcs_vehicle::{EmergencyAction, EmergencyGate, EmergencyRefused, VehicleState, VehicleStateModel};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::http::{CommandClient, CommandError};
use crate::oplog::{OperatorLog, DEFAULT_CAPACITY};
use crate::session::{ConnectionState, Connector, SessionConfig, SessionEvent, TelemetrySession, WsConnector};
use crate::Endpoint;

#[derive(Debug, thiserror::Error)]
pub enum StationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Emergency(#[from] EmergencyRefused),
    #[error("unknown perception module `{0}`")]
    UnknownModule(String),
    #[error("perception module `{0}` cannot be toggled")]
    NotTogglable(String),
}

#[derive(Debug, Clone)]
pub struct StationConfig {
    pub session: SessionConfig,
    pub min_separation_m: f64,
    pub depth_colors: DepthColorMapper,
    pub emergency_min_interval: Duration,
    pub setpoint_alt_m: f64,
    pub oplog_capacity: usize,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            min_separation_m: DEFAULT_MIN_SEPARATION_M,
            depth_colors: DepthColorMapper::default(),
            emergency_min_interval: Duration::from_secs(2),
            setpoint_alt_m: DEFAULT_SETPOINT_ALT_M,
            oplog_capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Drive with [`GroundStation::next`] from a single task; every state change
/// happens there or in the command methods.
pub struct GroundStation<C: Connector = WsConnector> {
    session: TelemetrySession<C>,
    client: CommandClient,
    vehicle: VehicleStateModel,
    path: MissionPathTracker,
    log: OperatorLog,
    gate: EmergencyGate,
    capabilities: Option<Capabilities>,
    setpoint_alt_m: f64,
    reload_requested: bool,
}

impl<C: Connector> GroundStation<C> {
    /// Opens the telemetry channel against `endpoint` right away.
    pub fn new(connector: C, endpoint: Endpoint, cfg: StationConfig) -> Result<Self, StationError> {
        let client = CommandClient::new(endpoint.clone())?;
        let mut station = Self {
            session: TelemetrySession::new(connector, cfg.session),
            client,
            vehicle: VehicleStateModel::new(cfg.depth_colors),
            path: MissionPathTracker::new(cfg.min_separation_m),
            log: OperatorLog::new(cfg.oplog_capacity),
            gate: EmergencyGate::new(cfg.emergency_min_interval),
            capabilities: None,
            setpoint_alt_m: cfg.setpoint_alt_m,
            reload_requested: false,
        };
        station.set_endpoint(endpoint);
        Ok(station)
    }

    /// Re-hosts both the telemetry channel and the command client. Nothing
    /// from the previous host is applied afterwards.
    pub fn set_endpoint(&mut self, endpoint: Endpoint) {
        self.log.push(LogLevel::Info, format!("Connecting to {}", endpoint));
        self.session.set_endpoint(endpoint.clone());
        self.client.set_endpoint(endpoint);
        self.capabilities = None;
        self.vehicle.mark_disconnected();
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.client.endpoint()
    }

    pub fn connection(&self) -> ConnectionState {
        self.session.state()
    }

    pub fn vehicle(&self) -> &VehicleState {
        self.vehicle.state()
    }

    pub fn path(&self) -> &MissionPathTracker {
        &self.path
    }

    pub fn log(&self) -> &OperatorLog {
        &self.log
    }

    pub fn client(&self) -> &CommandClient {
        &self.client
    }

    pub fn capabilities(&self) -> Option<&Capabilities> {
        self.capabilities.as_ref()
    }

    pub fn subscribe(&mut self, handler: impl FnMut(&SessionEvent) + Send + 'static) {
        self.session.subscribe(handler);
    }

    /// True once after the vehicle asked for its capabilities to be re-read.
    pub fn take_reload_request(&mut self) -> bool {
        std::mem::take(&mut self.reload_requested)
    }

    /// Waits for the next channel event and applies it.
    pub async fn next(&mut self) -> SessionEvent {
        let ev = self.session.recv().await;
        self.handle(&ev, Instant::now());
        ev
    }

    pub(crate) fn handle(&mut self, ev: &SessionEvent, now: Instant) {
        match ev {
            SessionEvent::Opened => self.log.push(LogLevel::Info, "Drone connected."),
            SessionEvent::Message(TelemetryMessage::Telemetry(t)) => {
                let was_connected = self.vehicle.state().connected;
                self.vehicle.apply(t, now);
                if !was_connected {
                    self.log.push(LogLevel::Info, format!("Telemetry flowing (status {}).", t.status));
                }
                if self.path.on_position(t.lat, t.lon) {
                    debug!("station: path now {} points", self.path.points().len());
                }
                if self.path.is_active() && is_complete(&t.status) {
                    self.path.on_mission_end();
                    self.log.push(LogLevel::Info, "Mission complete.");
                }
            }
            SessionEvent::Message(TelemetryMessage::Log(record)) => {
                self.log.push(record.level, record.message.clone());
            }
            SessionEvent::Message(TelemetryMessage::CapabilityReload) => {
                self.reload_requested = true;
                self.log.push(LogLevel::Info, "Vehicle capabilities changed.");
            }
            SessionEvent::Stale => {
                self.vehicle.mark_stale();
                self.log.push(LogLevel::Warning, "Telemetry lost; drone state may be outdated.");
            }
            SessionEvent::TransportError(e) => {
                self.vehicle.mark_disconnected();
                self.log.push(LogLevel::Error, format!("Drone connection error: {}", e));
            }
            SessionEvent::Closed => {
                self.vehicle.mark_disconnected();
                self.log.push(LogLevel::Warning, "Drone connection closed.");
            }
        }
    }

    pub async fn refresh_capabilities(&mut self) -> Result<&Capabilities, StationError> {
        let caps = match self.client.capabilities().await {
            Ok(caps) => caps,
            Err(e) => {
                self.log.push(LogLevel::Error, format!("Failed to load capabilities: {}", e));
                return Err(e.into());
            }
        };
        for reason in &caps.rejected {
            self.log.push(LogLevel::Warning, reason.clone());
        }
        self.log.push(LogLevel::Info, format!("Loaded {} missions.", caps.missions().len()));
        Ok(self.capabilities.insert(caps))
    }

    /// Validates and sends a mission; the path starts recording once the
    /// vehicle accepts it.
    pub async fn launch(
        &mut self,
        mission: &str,
        selection: &GeometrySelection,
        extras: &MissionExtras,
    ) -> Result<MissionAck, StationError> {
        if self.capabilities.is_none() {
            self.refresh_capabilities().await?;
        }
        let built = match &self.capabilities {
            Some(caps) => MissionPayloadBuilder::new(caps)
                .with_setpoint_alt(self.setpoint_alt_m)
                .build(Some(mission), selection, extras),
            None => Err(ValidationError::UnknownMission(mission.to_string())),
        };
        let payload = match built {
            Ok(p) => p,
            Err(e) => {
                self.log.push(LogLevel::Error, e.to_string());
                return Err(e.into());
            }
        };

        self.log.push(LogLevel::Info, format!("Sending mission: {}", payload.mission_type));
        match self.client.run_mission(&payload).await {
            Ok(ack) => {
                let msg = match &ack.status {
                    Some(status) => format!("Mission confirmed: {}", status),
                    None => "Mission accepted.".to_string(),
                };
                self.log.push(LogLevel::Info, msg);
                self.path.on_mission_start();
                Ok(ack)
            }
            Err(e) => {
                self.log.push(LogLevel::Error, format!("Mission failed: {}", e));
                Err(e.into())
            }
        }
    }

    pub async fn emergency(&mut self, action: EmergencyAction) -> Result<(), StationError> {
        let permit = match self.gate.authorize(self.vehicle.state(), action, Instant::now()) {
            Ok(p) => p,
            Err(e) => {
                self.log.push(LogLevel::Warning, format!("Emergency {} refused: {}", action.path(), e));
                return Err(e.into());
            }
        };
        self.log.push(LogLevel::Warning, format!("Sending {}", action.path()));
        match self.client.emergency(permit).await {
            Ok(()) => {
                self.log.push(LogLevel::Info, format!("{} acknowledged.", action.path()));
                Ok(())
            }
            Err(e) => {
                self.log.push(LogLevel::Error, format!("{} failed: {}", action.path(), e));
                Err(e.into())
            }
        }
    }

    /// Refused locally when the loaded capabilities mark the module fixed.
    pub async fn set_module_active(&mut self, name: &str, active: bool) -> Result<(), StationError> {
        if let Some(caps) = &self.capabilities {
            match caps.perception_modules.get(name) {
                None => {
                    self.log.push(LogLevel::Warning, format!("Unknown module {}.", name));
                    return Err(StationError::UnknownModule(name.to_string()));
                }
                Some(m) if !m.togglable => {
                    self.log.push(LogLevel::Warning, format!("Module {} cannot be toggled.", name));
                    return Err(StationError::NotTogglable(name.to_string()));
                }
                Some(_) => {}
            }
        }
        if let Err(e) = self.client.set_module_active(name, active).await {
            self.log.push(LogLevel::Error, format!("Toggling {} failed: {}", name, e));
            return Err(e.into());
        }
        if let Some(m) = self.capabilities.as_mut().and_then(|c| c.perception_modules.get_mut(name)) {
            m.active = active;
        }
        let state = if active { "on" } else { "off" };
        self.log.push(LogLevel::Info, format!("Module {} switched {}.", name, state));
        Ok(())
    }

    pub async fn dems(&mut self) -> Result<Vec<DemEntry>, StationError> {
        match self.client.dems().await {
            Ok(dems) => Ok(dems),
            Err(e) => {
                self.log.push(LogLevel::Error, format!("Failed to list terrain models: {}", e));
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::{telemetry_frame, RecordingConnector};
    use crate::session::Frame;
    use crate::TransportError;
    use gcs_nav::LatLon;

    fn station() -> (GroundStation<RecordingConnector>, RecordingConnector) {
        let conn = RecordingConnector::default();
        let st = GroundStation::new(conn.clone(), Endpoint::parse("a.local").unwrap(), StationConfig::default()).unwrap();
        (st, conn)
    }

    fn feed(st: &mut GroundStation<RecordingConnector>, frame: Frame, now: Instant) {
        if let Some(ev) = st.session.accept(frame, now) {
            st.handle(&ev, now);
        }
    }

    fn tick(st: &mut GroundStation<RecordingConnector>, now: Instant) {
        if let Some(ev) = st.session.check_staleness(now) {
            st.handle(&ev, now);
        }
    }

    fn with_caps(st: &mut GroundStation<RecordingConnector>) {
        let inner = r#"{
            "missions": [{"name": "Survey", "geometry_type": "polygon"}],
            "perception_modules": {
                "detector": {"active": true, "togglable": true},
                "slam": {"active": true, "togglable": false}
            }
        }"#;
        st.capabilities = Some(Capabilities::from_json(inner).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn staleness_toggles_connected() {
        let (mut st, _conn) = station();
        let t0 = Instant::now();
        feed(&mut st, Frame::Opened, t0);
        feed(&mut st, telemetry_frame("READY", 37.0), t0);
        assert!(st.vehicle().connected);

        tick(&mut st, t0 + Duration::from_millis(4900));
        assert!(st.vehicle().connected);
        tick(&mut st, t0 + Duration::from_millis(5100));
        assert!(!st.vehicle().connected);
        assert_eq!(st.log().latest().unwrap().level, LogLevel::Warning);
        // last-known-good survives
        assert_eq!(st.vehicle().status, "READY");

        feed(&mut st, telemetry_frame("READY", 37.0), t0 + Duration::from_secs(6));
        assert!(st.vehicle().connected);
    }

    #[tokio::test(start_paused = true)]
    async fn old_channel_never_touches_vehicle() {
        let (mut st, conn) = station();
        let old = conn.sink(0);
        st.set_endpoint(Endpoint::parse("b.local").unwrap());
        let new = conn.sink(1);

        old.send(Frame::Opened);
        old.send(telemetry_frame("MISSION", 1.0));
        new.send(Frame::Opened);
        new.send(telemetry_frame("READY", 2.0));

        assert_eq!(st.next().await, SessionEvent::Opened);
        st.next().await;
        assert_eq!(st.vehicle().status, "READY");
        assert_eq!(st.vehicle().position, Some(LatLon::new(2.0, -122.084)));
        assert_eq!(st.endpoint().to_string(), "http://b.local");
    }

    #[tokio::test(start_paused = true)]
    async fn path_records_only_during_mission() {
        let (mut st, _conn) = station();
        let t0 = Instant::now();
        feed(&mut st, telemetry_frame("READY", 37.0), t0);
        assert!(st.path().points().is_empty());

        st.path.on_mission_start();
        feed(&mut st, telemetry_frame("MISSION", 37.0), t0);
        feed(&mut st, telemetry_frame("MISSION", 37.000001), t0);
        feed(&mut st, telemetry_frame("MISSION", 37.0001), t0);
        assert_eq!(st.path().points().len(), 2);

        feed(&mut st, Frame::Text(r#"{"type":"capability_reload"}"#.into()), t0);
        assert!(st.path().is_active());
        assert!(st.take_reload_request());
        assert!(!st.take_reload_request());

        feed(&mut st, telemetry_frame("COMPLETE", 37.0002), t0);
        assert!(!st.path().is_active());
        assert_eq!(st.path().points().len(), 3);
        assert_eq!(st.log().latest().unwrap().message, "Mission complete.");
    }

    #[tokio::test(start_paused = true)]
    async fn vehicle_logs_land_in_operator_log() {
        let (mut st, _conn) = station();
        feed(&mut st, Frame::Text(r#"{"log":{"message":"Obstacle ahead","level":"warning"}}"#.into()), Instant::now());
        let e = st.log().latest().unwrap();
        assert_eq!(e.message, "Obstacle ahead");
        assert_eq!(e.level, LogLevel::Warning);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_disconnects() {
        let (mut st, _conn) = station();
        let t0 = Instant::now();
        feed(&mut st, telemetry_frame("FLYING", 37.0), t0);
        feed(&mut st, Frame::Failed(TransportError::Stream("reset".into())), t0);
        assert!(!st.vehicle().connected);
        assert_eq!(st.connection(), ConnectionState::Errored);
        assert!(st.log().latest().unwrap().message.starts_with("Drone connection error"));
    }

    #[tokio::test(start_paused = true)]
    async fn emergency_refused_while_disconnected() {
        let (mut st, _conn) = station();
        let err = st.emergency(EmergencyAction::Land).await.unwrap_err();
        assert!(matches!(err, StationError::Emergency(EmergencyRefused::Disconnected)));
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_mission_is_not_sent() {
        let (mut st, _conn) = station();
        with_caps(&mut st);
        let mut sel = GeometrySelection::default();
        sel.set_polygon(vec![vec![LatLon::new(0.0, 0.0), LatLon::new(0.0, 1.0)]]);

        let err = st.launch("survey", &sel, &MissionExtras::default()).await.unwrap_err();
        assert!(matches!(err, StationError::Validation(ValidationError::MissingPolygon)));
        assert_eq!(st.log().latest().unwrap().level, LogLevel::Error);
        assert!(!st.path().is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn module_toggle_checked_locally() {
        let (mut st, _conn) = station();
        with_caps(&mut st);
        assert!(matches!(st.set_module_active("slam", false).await, Err(StationError::NotTogglable(_))));
        assert!(matches!(st.set_module_active("lidar", true).await, Err(StationError::UnknownModule(_))));
        let e = st.log().latest().unwrap();
        assert_eq!(e.level, LogLevel::Warning);
        assert_eq!(e.message, "Unknown module lidar.");
    }

    #[tokio::test]
    async fn dem_listing_failure_is_logged() {
        let conn = RecordingConnector::default();
        let ep = Endpoint::parse("127.0.0.1:1").unwrap();
        let mut st = GroundStation::new(conn, ep, StationConfig::default()).unwrap();
        assert!(st.dems().await.is_err());
        let e = st.log().latest().unwrap();
        assert_eq!(e.level, LogLevel::Error);
        assert!(e.message.starts_with("Failed to list terrain models"));
    }
}
