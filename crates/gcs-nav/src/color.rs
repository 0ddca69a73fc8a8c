use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::geo::{clamp01, lerp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for Color {
    type Err = ColorMapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(ColorMapError::BadColor(s.to_string()));
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| ColorMapError::BadColor(s.to_string()));
        Ok(Color::rgb(channel(0)?, channel(2)?, channel(4)?))
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ColorMapError {
    #[error("a gradient needs at least 2 stops, got {0}")]
    TooFewStops(usize),
    #[error("depth range must be finite with max > min (got {min}..{max})")]
    BadRange { min: f64, max: f64 },
    #[error("not a #rrggbb color: `{0}`")]
    BadColor(String),
}

/// Maps a depth (or height) scalar onto a color gradient.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthColorMapper {
    stops: Vec<Color>,
    min: f64,
    max: f64,
    invert: bool,
}

impl DepthColorMapper {
    pub const FALLBACK: Color = Color::rgb(0x80, 0x80, 0x80);

    pub fn new(stops: Vec<Color>, min: f64, max: f64, invert: bool) -> Result<Self, ColorMapError> {
        if stops.len() < 2 {
            return Err(ColorMapError::TooFewStops(stops.len()));
        }
        if !(min.is_finite() && max.is_finite() && max > min) {
            return Err(ColorMapError::BadRange { min, max });
        }
        Ok(Self { stops, min, max, invert })
    }

    pub fn color_for(&self, depth: f64) -> Color {
        if !depth.is_finite() {
            return Self::FALLBACK;
        }
        let mut t = clamp01((depth - self.min) / (self.max - self.min));
        if self.invert {
            t = 1.0 - t;
        }

        let last = self.stops.len() - 1;
        let scaled = t * last as f64;
        let i = (scaled.floor() as usize).min(last - 1);
        let frac = scaled - i as f64;
        let (a, b) = (self.stops[i], self.stops[i + 1]);
        let mix = |x: u8, y: u8| lerp(x as f64, y as f64, frac).round().clamp(0.0, 255.0) as u8;
        Color::rgb(mix(a.r, b.r), mix(a.g, b.g), mix(a.b, b.b))
    }
}

impl Default for DepthColorMapper {
    /// Blue (shallow) through red (deep) over 0..30 m.
    fn default() -> Self {
        Self {
            stops: vec![
                Color::rgb(0x00, 0x00, 0xff),
                Color::rgb(0x00, 0xff, 0xff),
                Color::rgb(0x00, 0xff, 0x00),
                Color::rgb(0xff, 0xff, 0x00),
                Color::rgb(0xff, 0x00, 0x00),
            ],
            min: 0.0,
            max: 30.0,
            invert: false,
        }
    }
}
