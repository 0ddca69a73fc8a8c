use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Instant;
use tracing::{info, warn};

use gcs_link::{doctor as link_doctor, CommandClient, Endpoint, GroundStation, RemoteIdBroadcaster};
use gcs_link::{SessionConfig, SessionEvent, StationConfig, WsConnector};
use gcs_mission::{GeometrySelection, MissionExtras, TerrainUpload, DEFAULT_SETPOINT_ALT_M};
use gcs_nav::geo::parse_vertices;
use gcs_nav::gnss::GnssSource;
use gcs_nav::path::DEFAULT_MIN_SEPARATION_M;
use gcs_nav::{doctor as nav_doctor, LatLon};
use gcs_proto::TelemetryMessage;
use gcs_vehicle::{EmergencyAction, EmergencyConfig, VehicleState};

#[derive(Debug, Parser)]
#[command(name = "gcs", version, about = "Ground control client for a single survey drone")]
struct Cli {
    #[arg(long)]
    config: String,

    /// Vehicle address or a `[link.presets]` name; overrides `link.host`.
    #[arg(long)]
    host: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Doctor,
    /// Follow live telemetry until Ctrl-C. Type a host (or preset) to re-host.
    Monitor,
    Missions,
    Modules,
    Module {
        name: String,
        state: Switch,
    },
    Dems {
        /// Only list terrain models covering this `lat,lon`.
        #[arg(long)]
        at: Option<LatLon>,
    },
    Launch(LaunchArgs),
    Emergency {
        action: EmergencyAction,
        /// How long to wait for live telemetry before giving up.
        #[arg(long, default_value_t = 5)]
        wait_s: u64,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

#[derive(Debug, clap::Args)]
struct LaunchArgs {
    mission: String,
    #[arg(long)]
    point: Option<LatLon>,
    /// Vertices as `lat,lon;lat,lon;...`
    #[arg(long)]
    polygon: Option<String>,
    #[arg(long)]
    polyline: Option<String>,
    /// Terrain model file uploaded with the mission.
    #[arg(long)]
    dem_file: Option<String>,
    /// Terrain model already stored on the vehicle.
    #[arg(long)]
    dem: Option<String>,
    #[arg(long)]
    point_cloud: bool,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct Config {
    link: LinkCfg,
    telemetry: TelemetryCfg,
    path: PathCfg,
    depth: DepthCfg,
    mission: MissionCfg,
    remote_id: RemoteIdCfg,
    emergency: EmergencyConfig,
}

#[derive(Debug, serde::Deserialize)]
#[serde(default)]
struct LinkCfg {
    host: String,
    presets: BTreeMap<String, String>,
}

impl Default for LinkCfg {
    fn default() -> Self {
        Self { host: "localhost:8000".into(), presets: BTreeMap::new() }
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(default)]
struct TelemetryCfg {
    stale_after_s: f64,
    tick_ms: u64,
}

impl Default for TelemetryCfg {
    fn default() -> Self {
        Self { stale_after_s: 5.0, tick_ms: 1000 }
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(default)]
struct PathCfg {
    min_separation_m: f64,
}

impl Default for PathCfg {
    fn default() -> Self {
        Self { min_separation_m: DEFAULT_MIN_SEPARATION_M }
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(default)]
struct DepthCfg {
    stops: Vec<String>,
    min: f64,
    max: f64,
    invert: bool,
}

impl Default for DepthCfg {
    fn default() -> Self {
        Self {
            stops: ["#0000ff", "#00ffff", "#00ff00", "#ffff00", "#ff0000"].map(String::from).to_vec(),
            min: 0.0,
            max: 30.0,
            invert: false,
        }
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(default)]
struct MissionCfg {
    default_alt_m: f64,
}

impl Default for MissionCfg {
    fn default() -> Self {
        Self { default_alt_m: DEFAULT_SETPOINT_ALT_M }
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(default)]
struct RemoteIdCfg {
    enable: bool,
    /// `fixed`, `nmea-serial` or `nmea-file`.
    source: String,
    nmea_device: Option<String>,
    baud: u32,
    nmea_file: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    interval_ms: u64,
}

impl Default for RemoteIdCfg {
    fn default() -> Self {
        Self {
            enable: false,
            source: "fixed".into(),
            nmea_device: None,
            baud: 9600,
            nmea_file: None,
            lat: None,
            lon: None,
            interval_ms: 1000,
        }
    }
}

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).context("read config")?;
    parse_config(&s)
}

fn parse_config(s: &str) -> Result<Config> {
    toml::from_str(s).context("parse config toml")
}

/// Preset names win over literal hosts.
fn resolve_host(cfg: &Config, raw: &str) -> Result<Endpoint> {
    let raw = raw.trim();
    let host = cfg.link.presets.get(raw).map(String::as_str).unwrap_or(raw);
    link_doctor::check_endpoint(host)
}

fn station_config(cfg: &Config) -> Result<StationConfig> {
    link_doctor::check_telemetry_timing(cfg.telemetry.stale_after_s, cfg.telemetry.tick_ms)?;
    nav_doctor::check_path_separation(cfg.path.min_separation_m)?;
    anyhow::ensure!(cfg.emergency.min_interval_ms > 0, "emergency.min_interval_ms must be > 0");
    let depth_colors = nav_doctor::check_depth_gradient(&cfg.depth.stops, cfg.depth.min, cfg.depth.max, cfg.depth.invert)
        .context("depth gradient")?;
    let stale_after =
        Duration::try_from_secs_f64(cfg.telemetry.stale_after_s).context("telemetry.stale_after_s")?;
    Ok(StationConfig {
        session: SessionConfig {
            stale_after,
            tick: Duration::from_millis(cfg.telemetry.tick_ms),
        },
        min_separation_m: cfg.path.min_separation_m,
        depth_colors,
        emergency_min_interval: Duration::from_millis(cfg.emergency.min_interval_ms),
        setpoint_alt_m: cfg.mission.default_alt_m,
        ..Default::default()
    })
}

fn position_source(rid: &RemoteIdCfg) -> Result<GnssSource> {
    match rid.source.as_str() {
        "nmea-serial" => GnssSource::serial(rid.nmea_device.as_deref().context("remote_id.nmea_device missing")?, rid.baud),
        "nmea-file" => GnssSource::file(rid.nmea_file.as_deref().context("remote_id.nmea_file missing")?),
        "fixed" => {
            let at = LatLon::new(
                rid.lat.context("remote_id.lat missing")?,
                rid.lon.context("remote_id.lon missing")?,
            );
            nav_doctor::check_operator_position(&at)?;
            Ok(GnssSource::fixed(at, Duration::from_millis(rid.interval_ms.max(1))))
        }
        other => anyhow::bail!("unknown remote_id.source: {}", other),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;
    let host = cli.host.as_deref().unwrap_or(&cfg.link.host);

    match cli.cmd {
        Command::Doctor => doctor(&cfg, host)?,
        Command::Monitor => monitor(&cfg, resolve_host(&cfg, host)?).await?,
        Command::Missions => missions(resolve_host(&cfg, host)?).await?,
        Command::Modules => modules(resolve_host(&cfg, host)?).await?,
        Command::Module { name, state } => {
            let mut station = open_station(&cfg, resolve_host(&cfg, host)?)?;
            station.refresh_capabilities().await?;
            station.set_module_active(&name, matches!(state, Switch::On)).await?;
            println!("{} {}", name, if matches!(state, Switch::On) { "on" } else { "off" });
        }
        Command::Dems { at } => dems(resolve_host(&cfg, host)?, at).await?,
        Command::Launch(args) => launch(&cfg, resolve_host(&cfg, host)?, args).await?,
        Command::Emergency { action, wait_s } => emergency(&cfg, resolve_host(&cfg, host)?, action, wait_s).await?,
    }
    Ok(())
}

fn doctor(cfg: &Config, host: &str) -> Result<()> {
    info!("doctor: starting");

    let ep = resolve_host(cfg, host)?;
    info!("doctor: vehicle at {} (stream {})", ep, ep.stream_url());
    for (name, preset) in &cfg.link.presets {
        link_doctor::check_endpoint(preset).with_context(|| format!("link.presets.{}", name))?;
    }
    link_doctor::check_telemetry_timing(cfg.telemetry.stale_after_s, cfg.telemetry.tick_ms)?;
    nav_doctor::check_path_separation(cfg.path.min_separation_m)?;
    nav_doctor::check_depth_gradient(&cfg.depth.stops, cfg.depth.min, cfg.depth.max, cfg.depth.invert)?;
    anyhow::ensure!(cfg.mission.default_alt_m > 0.0, "mission.default_alt_m must be > 0");
    anyhow::ensure!(cfg.emergency.min_interval_ms > 0, "emergency.min_interval_ms must be > 0");

    if cfg.remote_id.enable {
        link_doctor::check_remote_id_interval(cfg.remote_id.interval_ms)?;
        if cfg.remote_id.source == "fixed" {
            position_source(&cfg.remote_id)?;
        } else {
            anyhow::ensure!(
                matches!(cfg.remote_id.source.as_str(), "nmea-serial" | "nmea-file"),
                "unknown remote_id.source: {}",
                cfg.remote_id.source
            );
        }
    }

    info!("doctor: OK");
    Ok(())
}

fn open_station(cfg: &Config, endpoint: Endpoint) -> Result<GroundStation> {
    Ok(GroundStation::new(WsConnector, endpoint, station_config(cfg)?)?)
}

async fn load_capabilities(station: &mut GroundStation) {
    match station.refresh_capabilities().await {
        Ok(caps) => {
            for m in caps.missions() {
                info!("monitor: mission {}", m.label());
            }
        }
        Err(e) => warn!("monitor: capabilities unavailable: {:#}", e),
    }
}

async fn monitor(cfg: &Config, endpoint: Endpoint) -> Result<()> {
    info!("monitor: starting against {}", endpoint);
    let mut station = open_station(cfg, endpoint)?;
    load_capabilities(&mut station).await;

    link_doctor::check_remote_id_interval(cfg.remote_id.interval_ms)?;
    let mut remote_id = RemoteIdBroadcaster::new(Duration::from_millis(cfg.remote_id.interval_ms));
    if cfg.remote_id.enable {
        remote_id.enable(position_source(&cfg.remote_id)?, station.client().clone());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut last_hud: Option<Instant> = None;

    loop {
        tokio::select! {
            ev = station.next() => {
                if let SessionEvent::Message(TelemetryMessage::Telemetry(_)) = ev {
                    let due = last_hud.map(|t| t.elapsed() >= Duration::from_secs(1)).unwrap_or(true);
                    if due {
                        println!("{}", hud_line(station.vehicle(), station.path().points().len()));
                        last_hud = Some(Instant::now());
                    }
                }
                if station.take_reload_request() {
                    load_capabilities(&mut station).await;
                }
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(l)) if l.trim().is_empty() => {}
                Ok(Some(l)) => match resolve_host(cfg, &l) {
                    Ok(ep) => {
                        station.set_endpoint(ep);
                        load_capabilities(&mut station).await;
                        if remote_id.is_enabled() {
                            remote_id.enable(position_source(&cfg.remote_id)?, station.client().clone());
                        }
                    }
                    Err(e) => warn!("monitor: {:#}", e),
                },
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!("monitor: stdin: {}", e);
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("monitor: interrupted");
                break;
            }
        }
    }

    remote_id.disable();
    Ok(())
}

fn hud_line(v: &VehicleState, path_points: usize) -> String {
    let pos = v
        .position
        .map(|p| format!("{:.6},{:.6}", p.lat, p.lon))
        .unwrap_or_else(|| "--".into());
    let color = v.depth_color.map(|c| c.to_string()).unwrap_or_else(|| "--".into());
    format!(
        "{:<14} {:?} air={} link={} pos={} hdg={:.0} gps={}{} bat={:.1}V{} h={:.1}m d={:.1}m v={:.1}m/s cam={} depth={} path={}",
        v.status,
        v.status_category,
        v.in_flight,
        if v.connected { "up" } else { "down" },
        pos,
        v.heading,
        v.gps_satellites,
        if v.gps_fixed() { "" } else { "(nofix)" },
        v.battery_voltage,
        if v.battery_low() { "(LOW)" } else { "" },
        v.height,
        v.distance,
        v.speed,
        v.num_cameras,
        color,
        path_points,
    )
}

async fn missions(endpoint: Endpoint) -> Result<()> {
    let caps = CommandClient::new(endpoint)?.capabilities().await?;
    for reason in &caps.rejected {
        warn!("missions: {}", reason);
    }
    for m in caps.missions() {
        println!("{:<24} {:?}", m.label(), m.geometry_type);
    }
    Ok(())
}

async fn modules(endpoint: Endpoint) -> Result<()> {
    let caps = CommandClient::new(endpoint)?.capabilities().await?;
    for (name, m) in &caps.perception_modules {
        let fixed = if m.togglable { "" } else { " (fixed)" };
        println!("{:<20} {}{}", name, if m.active { "on" } else { "off" }, fixed);
    }
    println!("point cloud sensor: {}", caps.hardware.has_point_cloud_sensor());
    Ok(())
}

async fn dems(endpoint: Endpoint, at: Option<LatLon>) -> Result<()> {
    let entries = CommandClient::new(endpoint)?.dems().await?;
    for d in entries {
        let covers = match (at, d.bounds) {
            (Some(p), Some(b)) => b.contains(p.lat, p.lon),
            (Some(_), None) => false,
            (None, _) => true,
        };
        if covers {
            println!("{}", d.filename);
        }
    }
    Ok(())
}

async fn launch(cfg: &Config, endpoint: Endpoint, args: LaunchArgs) -> Result<()> {
    let mut sel = GeometrySelection::default();
    if let Some(p) = args.point {
        sel.set_point(p);
    }
    if let Some(s) = &args.polygon {
        sel.set_polygon(vec![parse_vertices(s).context("--polygon")?]);
    }
    if let Some(s) = &args.polyline {
        sel.set_polyline(parse_vertices(s).context("--polyline")?);
    }

    let dem_upload = match &args.dem_file {
        Some(path) => {
            let content = tokio::fs::read(path).await.with_context(|| format!("read {}", path))?;
            let filename = Path::new(path)
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(path.as_str())
                .to_string();
            Some(TerrainUpload { filename, content: Bytes::from(content) })
        }
        None => None,
    };
    let extras = MissionExtras { dem_upload, dem_name: args.dem.clone(), capture_point_cloud: args.point_cloud };

    let mut station = open_station(cfg, endpoint)?;
    let ack = station.launch(&args.mission, &sel, &extras).await?;
    match ack.status {
        Some(status) => println!("Mission confirmed: {}", status),
        None => println!("Mission accepted."),
    }
    Ok(())
}

async fn emergency(cfg: &Config, endpoint: Endpoint, action: EmergencyAction, wait_s: u64) -> Result<()> {
    let mut station = open_station(cfg, endpoint)?;
    let deadline = Instant::now() + Duration::from_secs(wait_s);
    while !station.vehicle().connected {
        match tokio::time::timeout_at(deadline, station.next()).await {
            Ok(SessionEvent::TransportError(e)) => anyhow::bail!("telemetry channel failed: {}", e),
            Ok(_) => {}
            Err(_) => anyhow::bail!("no telemetry within {}s; refusing {}", wait_s, action.path()),
        }
    }
    station.emergency(action).await?;
    println!("{} sent", action.path());
    Ok(())
}
