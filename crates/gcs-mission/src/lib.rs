pub mod builder;
pub mod selection;

pub use builder::{MissionExtras, MissionPayload, MissionPayloadBuilder, TerrainUpload, ValidationError, DEFAULT_SETPOINT_ALT_M};
pub use selection::GeometrySelection;
