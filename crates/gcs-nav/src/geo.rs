use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite() && self.lat.abs() <= 90.0 && self.lon.abs() <= 180.0
    }

    pub fn distance_m(&self, other: &LatLon) -> f64 {
        haversine_m(self.lat, self.lon, other.lat, other.lon)
    }
}

/// Parses `"lat,lon"` (whitespace around either number is ignored).
impl FromStr for LatLon {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lon) = s.split_once(',').with_context(|| format!("expected `lat,lon`, got `{}`", s))?;
        let p = LatLon::new(
            lat.trim().parse().with_context(|| format!("bad latitude `{}`", lat.trim()))?,
            lon.trim().parse().with_context(|| format!("bad longitude `{}`", lon.trim()))?,
        );
        anyhow::ensure!(p.is_valid(), "coordinate out of range: {}", s);
        Ok(p)
    }
}

/// Parses a `;`-separated vertex list, e.g. `"37.1,-122.1; 37.2,-122.1"`.
pub fn parse_vertices(s: &str) -> anyhow::Result<Vec<LatLon>> {
    s.split(';').map(str::trim).filter(|v| !v.is_empty()).map(LatLon::from_str).collect()
}

pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2) + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

pub fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_one_degree_latitude() {
        let d = haversine_m(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_195.0).abs() < 1.0, "{}", d);
        assert_eq!(haversine_m(37.4, -122.0, 37.4, -122.0), 0.0);
    }

    #[test]
    fn lerp_and_clamp() {
        assert_eq!(lerp(10.0, 20.0, 0.25), 12.5);
        assert_eq!(clamp01(-3.0), 0.0);
        assert_eq!(clamp01(7.0), 1.0);
        assert_eq!(clamp01(0.4), 0.4);
    }

    #[test]
    fn parses_coordinates() {
        let p: LatLon = " 37.42 , -122.08 ".parse().unwrap();
        assert_eq!(p, LatLon::new(37.42, -122.08));
        assert!("91,0".parse::<LatLon>().is_err());
        assert!("37.42".parse::<LatLon>().is_err());

        let ring = parse_vertices("1,1; 1,2;2,2 ;").unwrap();
        assert_eq!(ring, vec![LatLon::new(1.0, 1.0), LatLon::new(1.0, 2.0), LatLon::new(2.0, 2.0)]);
    }
}
