pub mod color;
pub mod doctor;
pub mod geo;
pub mod gnss;
pub mod path;

pub use color::{Color, DepthColorMapper};
pub use geo::LatLon;
pub use path::MissionPathTracker;
