use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

use crate::state::VehicleState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmergencyAction {
    Land,
    ReturnToLaunch,
    Hold,
    Stop,
}

impl EmergencyAction {
    /// Endpoint path, relative to the base address.
    pub fn path(&self) -> &'static str {
        match self {
            EmergencyAction::Land => "emergency_land",
            EmergencyAction::ReturnToLaunch => "emergency_rtl",
            EmergencyAction::Hold => "emergency_hold",
            EmergencyAction::Stop => "emergency_stop",
        }
    }
}

impl FromStr for EmergencyAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "land" => Ok(EmergencyAction::Land),
            "rtl" | "return" => Ok(EmergencyAction::ReturnToLaunch),
            "hold" | "loiter" => Ok(EmergencyAction::Hold),
            "stop" | "kill" => Ok(EmergencyAction::Stop),
            other => Err(format!("unknown emergency action `{}` (land|rtl|hold|stop)", other)),
        }
    }
}

/// Proof that an emergency command was authorized against a connected vehicle.
/// Only [`EmergencyGate::authorize`] can mint one.
#[derive(Debug)]
pub struct EmergencyPermit {
    action: EmergencyAction,
}

impl EmergencyPermit {
    pub fn action(&self) -> EmergencyAction {
        self.action
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EmergencyRefused {
    #[error("vehicle is not connected")]
    Disconnected,
    #[error("{action:?} sent too recently; retry in {retry_in:?}")]
    RateLimited { action: EmergencyAction, retry_in: Duration },
}

#[derive(Debug)]
pub struct EmergencyGate {
    last_sent: HashMap<EmergencyAction, Instant>,
    min_interval: Duration,
}

impl EmergencyGate {
    pub fn new(min_interval: Duration) -> Self {
        Self { last_sent: HashMap::new(), min_interval }
    }

    /// Whether emergency controls should be offered at all.
    pub fn enabled(state: &VehicleState) -> bool {
        state.connected
    }

    pub fn authorize(
        &mut self,
        state: &VehicleState,
        action: EmergencyAction,
        now: Instant,
    ) -> Result<EmergencyPermit, EmergencyRefused> {
        if !Self::enabled(state) {
            return Err(EmergencyRefused::Disconnected);
        }
        if let Some(t) = self.last_sent.get(&action) {
            let since = now.saturating_duration_since(*t);
            if since < self.min_interval {
                warn!("{:?} rate-limited", action);
                return Err(EmergencyRefused::RateLimited { action, retry_in: self.min_interval - since });
            }
        }
        self.last_sent.insert(action, now);
        Ok(EmergencyPermit { action })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected() -> VehicleState {
        VehicleState { connected: true, ..Default::default() }
    }

    #[test]
    fn refuses_while_disconnected() {
        let mut gate = EmergencyGate::new(Duration::from_secs(2));
        let state = VehicleState::default();
        assert!(!EmergencyGate::enabled(&state));
        assert_eq!(
            gate.authorize(&state, EmergencyAction::Land, Instant::now()).unwrap_err(),
            EmergencyRefused::Disconnected
        );
    }

    #[test]
    fn rate_limits_per_action() {
        let mut gate = EmergencyGate::new(Duration::from_secs(2));
        let state = connected();
        let t0 = Instant::now();

        let permit = gate.authorize(&state, EmergencyAction::Land, t0).unwrap();
        assert_eq!(permit.action(), EmergencyAction::Land);
        assert!(matches!(
            gate.authorize(&state, EmergencyAction::Land, t0 + Duration::from_millis(500)),
            Err(EmergencyRefused::RateLimited { retry_in, .. }) if retry_in == Duration::from_millis(1500)
        ));
        assert!(gate.authorize(&state, EmergencyAction::Hold, t0 + Duration::from_millis(500)).is_ok());
        assert!(gate.authorize(&state, EmergencyAction::Land, t0 + Duration::from_secs(2)).is_ok());
    }

    #[test]
    fn parses_actions() {
        assert_eq!("RTL".parse::<EmergencyAction>(), Ok(EmergencyAction::ReturnToLaunch));
        assert_eq!("land".parse::<EmergencyAction>().unwrap().path(), "emergency_land");
        assert!("dance".parse::<EmergencyAction>().is_err());
    }
}
