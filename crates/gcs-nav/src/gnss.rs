use anyhow::{Context, Result};
use std::future::Future;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::debug;

use crate::geo::LatLon;

/// One sample of the operator's own position.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorFix {
    pub lat: f64,
    pub lon: f64,
    pub alt_m: Option<f64>,
    pub hdop: Option<f32>,
    pub sats: Option<u8>,
    pub ts: OffsetDateTime,
}

/// Anything that can keep producing operator positions.
pub trait PositionSource: Send + 'static {
    fn next_fix(&mut self) -> impl Future<Output = Result<OperatorFix>> + Send;
}

/// Last GGA sentence seen, merged into the next RMC fix.
#[derive(Debug, Clone, Copy, Default)]
pub struct GgaData {
    sats: u8,
    hdop: f32,
    alt_m: Option<f64>,
}

pub enum GnssSource {
    Serial { reader: BufReader<SerialStream>, gga: Option<GgaData> },
    File { reader: BufReader<File>, gga: Option<GgaData> },
    Fixed { at: LatLon, period: Duration, primed: bool },
}

impl GnssSource {
    pub fn serial(dev: &str, baud: u32) -> Result<Self> {
        let port = tokio_serial::new(dev, baud)
            .open_native_async()
            .with_context(|| format!("open serial {}", dev))?;
        Ok(Self::Serial { reader: BufReader::new(port), gga: None })
    }

    pub fn file(path: &str) -> Result<Self> {
        let f = std::fs::File::open(path).with_context(|| format!("open nmea file {}", path))?;
        Ok(Self::File { reader: BufReader::new(File::from_std(f)), gga: None })
    }

    /// A stationary operator; re-reports the same position every `period`.
    pub fn fixed(at: LatLon, period: Duration) -> Self {
        Self::Fixed { at, period, primed: false }
    }

    pub async fn next_fix(&mut self) -> Result<OperatorFix> {
        let mut line = String::new();
        loop {
            line.clear();
            let gga = match self {
                GnssSource::Fixed { at, period, primed } => {
                    if *primed {
                        tokio::time::sleep(*period).await;
                    }
                    *primed = true;
                    return Ok(OperatorFix {
                        lat: at.lat,
                        lon: at.lon,
                        alt_m: None,
                        hdop: None,
                        sats: None,
                        ts: OffsetDateTime::now_utc(),
                    });
                }
                GnssSource::Serial { reader, gga } => {
                    let n = reader.read_line(&mut line).await?;
                    anyhow::ensure!(n > 0, "serial gnss stream closed");
                    gga
                }
                GnssSource::File { reader, gga } => {
                    let n = reader.read_line(&mut line).await?;
                    if n == 0 {
                        // EOF: wait for the file to grow
                        tokio::time::sleep(Duration::from_millis(500)).await;
                        continue;
                    }
                    gga
                }
            };
            if let Some(fix) = parse_nmea_line(line.trim(), gga) {
                return Ok(fix);
            }
        }
    }
}

impl PositionSource for GnssSource {
    fn next_fix(&mut self) -> impl Future<Output = Result<OperatorFix>> + Send {
        GnssSource::next_fix(self)
    }
}

// Minimal NMEA: GGA carries satellites/hdop/altitude, RMC carries the position.
fn parse_nmea_line(s: &str, last_gga: &mut Option<GgaData>) -> Option<OperatorFix> {
    let parts: Vec<&str> = s.split(',').collect();
    let talker = parts.first()?;

    if talker.len() == 6 && talker.starts_with('$') && talker.ends_with("GGA") {
        if parts.len() > 9 {
            *last_gga = Some(GgaData {
                sats: parts[7].parse().unwrap_or(0),
                hdop: parts[8].parse().unwrap_or(99.9),
                alt_m: parts[9].parse().ok(),
            });
        }
        return None;
    }

    if talker.len() == 6 && talker.starts_with('$') && talker.ends_with("RMC") && parts.len() > 6 {
        // parts[2]=status A/V, parts[3]=lat ddmm.mmmm, parts[4]=N/S, parts[5]=lon dddmm.mmmm, parts[6]=E/W
        if parts[2] != "A" {
            debug!("gnss: RMC without valid fix ({})", parts[2]);
            return None;
        }
        let lat = parse_deg_min(parts[3], parts[4])?;
        let lon = parse_deg_min(parts[5], parts[6])?;
        let gga = *last_gga;
        return Some(OperatorFix {
            lat,
            lon,
            alt_m: gga.and_then(|g| g.alt_m),
            hdop: gga.map(|g| g.hdop),
            sats: gga.map(|g| g.sats),
            ts: OffsetDateTime::now_utc(),
        });
    }

    None
}

fn parse_deg_min(v: &str, hemi: &str) -> Option<f64> {
    if v.is_empty() {
        return None;
    }
    // lat: ddmm.mmmm, lon: dddmm.mmmm
    let dot = v.find('.')?;
    let deg_len = if dot > 4 { 3 } else { 2 };
    let deg: f64 = v.get(..deg_len)?.parse().ok()?;
    let min: f64 = v.get(deg_len..)?.parse().ok()?;
    let mut out = deg + (min / 60.0);
    if hemi == "S" || hemi == "W" {
        out = -out;
    }
    Some(out)
}
