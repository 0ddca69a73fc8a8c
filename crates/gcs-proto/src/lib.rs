//! Wire types shared between the ground station and the vehicle endpoint.

pub mod capabilities;
pub mod command;
pub mod telemetry;

pub use capabilities::{
    Capabilities, CapabilitiesError, DemBounds, DemEntry, GeometryType, Hardware, MissionDescriptor, PerceptionModule,
};
pub use command::{MissionAck, ModuleToggle, RemoteIdReport};
pub use telemetry::{decode, DecodeError, LogLevel, LogRecord, Telemetry, TelemetryMessage};
