use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One decoded frame from the streaming channel.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryMessage {
    Telemetry(Telemetry),
    Log(LogRecord),
    CapabilityReload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub lat: f64,
    pub lon: f64,
    pub heading: f64,
    #[serde(default = "unknown_status")]
    pub status: String,
    pub gps_satellites: u32,
    #[serde(default)]
    pub num_cameras: u32,
    pub battery_voltage: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default)]
    pub distance: f64,
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub depth: Option<f64>,
}

fn unknown_status() -> String {
    "--".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    #[serde(alias = "warn")]
    Warning,
    Error,
    #[default]
    #[serde(other)]
    Normal,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Normal => "normal",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub level: LogLevel,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("frame is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame is not a json object")]
    NotAnObject,
    #[error("frame has no `type` discriminator")]
    MissingKind,
    #[error("unrecognized frame type `{0}`")]
    UnknownKind(String),
    #[error("malformed `{kind}` frame: {source}")]
    Malformed {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Classifies one text frame into a [`TelemetryMessage`].
///
/// A frame carrying a non-null `log` member is a log record regardless of its
/// `type`; the nested object wins over top-level fields.
pub fn decode(frame: &str) -> Result<TelemetryMessage, DecodeError> {
    let value: Value = serde_json::from_str(frame)?;
    let obj = value.as_object().ok_or(DecodeError::NotAnObject)?;

    if let Some(log) = obj.get("log").filter(|v| !v.is_null()) {
        return decode_log(log.clone());
    }

    let kind = obj.get("type").and_then(Value::as_str).map(str::to_owned);
    match kind.as_deref() {
        Some("telemetry") => serde_json::from_value(value)
            .map(TelemetryMessage::Telemetry)
            .map_err(|source| DecodeError::Malformed { kind: "telemetry", source }),
        Some("log") => decode_log(value),
        Some("capability_reload" | "capabilities_reload" | "reload_capabilities") => {
            Ok(TelemetryMessage::CapabilityReload)
        }
        Some(other) => Err(DecodeError::UnknownKind(other.to_string())),
        None => Err(DecodeError::MissingKind),
    }
}

fn decode_log(value: Value) -> Result<TelemetryMessage, DecodeError> {
    match value {
        Value::String(message) => Ok(TelemetryMessage::Log(LogRecord { message, level: LogLevel::Normal })),
        other => serde_json::from_value(other)
            .map(TelemetryMessage::Log)
            .map_err(|source| DecodeError::Malformed { kind: "log", source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_telemetry_with_defaults() {
        let frame = r#"{"type":"telemetry","lat":37.42,"lon":-122.08,"heading":90.0,
            "gps_satellites":12,"battery_voltage":11.9}"#;
        let TelemetryMessage::Telemetry(t) = decode(frame).unwrap() else {
            panic!("expected telemetry");
        };
        assert_eq!(t.lat, 37.42);
        assert_eq!(t.status, "--");
        assert_eq!(t.num_cameras, 0);
        assert_eq!(t.depth, None);
    }

    #[test]
    fn log_type_and_log_member_are_one_case() {
        let by_type = decode(r#"{"type":"log","message":"armed","level":"info"}"#).unwrap();
        let by_member = decode(r#"{"type":"telemetry","log":{"message":"armed","level":"info"}}"#).unwrap();
        let expected = TelemetryMessage::Log(LogRecord { message: "armed".into(), level: LogLevel::Info });
        assert_eq!(by_type, expected);
        assert_eq!(by_member, expected);
    }

    #[test]
    fn null_log_member_keeps_telemetry() {
        let frame = r#"{"type":"telemetry","lat":37.42,"lon":-122.08,"heading":90.0,
            "gps_satellites":12,"battery_voltage":11.9,"status":"READY","log":null}"#;
        let TelemetryMessage::Telemetry(t) = decode(frame).unwrap() else {
            panic!("expected telemetry");
        };
        assert_eq!(t.status, "READY");
        assert_eq!(t.lat, 37.42);
    }

    #[test]
    fn unknown_log_level_is_normal() {
        let msg = decode(r#"{"type":"log","message":"x","level":"chatty"}"#).unwrap();
        assert_eq!(msg, TelemetryMessage::Log(LogRecord { message: "x".into(), level: LogLevel::Normal }));
        let msg = decode(r#"{"log":{"message":"y","level":"warn"}}"#).unwrap();
        assert_eq!(msg, TelemetryMessage::Log(LogRecord { message: "y".into(), level: LogLevel::Warning }));
    }

    #[test]
    fn capability_reload() {
        assert_eq!(decode(r#"{"type":"capability_reload"}"#).unwrap(), TelemetryMessage::CapabilityReload);
    }

    #[test]
    fn rejects_malformed_frames() {
        assert!(matches!(decode("not json"), Err(DecodeError::Json(_))));
        assert!(matches!(decode("[1,2]"), Err(DecodeError::NotAnObject)));
        assert!(matches!(decode(r#"{"lat":1}"#), Err(DecodeError::MissingKind)));
        assert!(matches!(decode(r#"{"type":"video"}"#), Err(DecodeError::UnknownKind(k)) if k == "video"));
        assert!(matches!(
            decode(r#"{"type":"telemetry","lat":"north"}"#),
            Err(DecodeError::Malformed { kind: "telemetry", .. })
        ));
    }
}
