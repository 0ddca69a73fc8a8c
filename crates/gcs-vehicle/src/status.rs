use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StatusCategory {
    Nominal,
    Transitional,
    Alarm,
}

const NOMINAL: &[&str] = &["READY", "ARMED", "FLYING", "MISSION", "MANUAL_FLIGHT", "COMPLETE", "IDLE"];
const TRANSITIONAL: &[&str] = &["INITIALIZING", "TAKING_OFF", "TAKEOFF", "RTL", "LANDING"];
const AIRBORNE: &[&str] = &["TAKING_OFF", "TAKEOFF", "FLYING", "MISSION", "LANDING", "MANUAL_FLIGHT", "RTL"];

/// Canonical form of a raw status: `" rtl_88 "` and `"Rtl"` both become `RTL`.
pub fn normalize(status: &str) -> String {
    let upper: String = status
        .trim()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c.to_ascii_uppercase() })
        .collect();
    match upper.rsplit_once('_') {
        Some((head, tail)) if !head.is_empty() && !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()) => {
            head.to_string()
        }
        _ => upper,
    }
}

/// Anything outside the known tables is an alarm.
pub fn classify(status: &str) -> StatusCategory {
    let s = normalize(status);
    if NOMINAL.contains(&s.as_str()) {
        StatusCategory::Nominal
    } else if TRANSITIONAL.contains(&s.as_str()) {
        StatusCategory::Transitional
    } else {
        StatusCategory::Alarm
    }
}

pub fn is_airborne(status: &str) -> bool {
    AIRBORNE.contains(&normalize(status).as_str())
}

pub fn is_complete(status: &str) -> bool {
    normalize(status) == "COMPLETE"
}
