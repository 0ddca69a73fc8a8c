pub mod safety;
pub mod state;
pub mod status;

use serde::Deserialize;

pub use safety::{EmergencyAction, EmergencyGate, EmergencyPermit, EmergencyRefused};
pub use state::{VehicleState, VehicleStateModel};
pub use status::{classify, StatusCategory};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmergencyConfig {
    /// Minimum spacing between two sends of the same emergency action.
    pub min_interval_ms: u64,
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self { min_interval_ms: 2000 }
    }
}
