use anyhow::Result;

use crate::color::{Color, DepthColorMapper};
use crate::geo::LatLon;

pub fn check_path_separation(min_separation_m: f64) -> Result<()> {
    anyhow::ensure!(min_separation_m.is_finite() && min_separation_m > 0.0, "path.min_separation_m must be > 0");
    anyhow::ensure!(min_separation_m <= 50.0, "path.min_separation_m above 50m would hide the trail");
    Ok(())
}

/// Builds the depth gradient from config strings, reporting the first bad entry.
pub fn check_depth_gradient(stops: &[String], min: f64, max: f64, invert: bool) -> Result<DepthColorMapper> {
    let colors = stops
        .iter()
        .map(|s| s.parse::<Color>())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(DepthColorMapper::new(colors, min, max, invert)?)
}

pub fn check_operator_position(at: &LatLon) -> Result<()> {
    anyhow::ensure!(at.is_valid(), "remote_id fixed position invalid: {},{}", at.lat, at.lon);
    Ok(())
}
