use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryType {
    None,
    Point,
    Polygon,
    Polyline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionDescriptor {
    pub name: String,
    #[serde(default = "default_available")]
    pub available: bool,
    #[serde(default = "no_geometry", deserialize_with = "geometry_or_none")]
    pub geometry_type: GeometryType,
    #[serde(default)]
    pub requires_activation: BTreeSet<String>,
}

fn default_available() -> bool {
    true
}

fn no_geometry() -> GeometryType {
    GeometryType::None
}

fn geometry_or_none<'de, D: Deserializer<'de>>(d: D) -> Result<GeometryType, D::Error> {
    Ok(Option::<GeometryType>::deserialize(d)?.unwrap_or(GeometryType::None))
}

impl MissionDescriptor {
    /// Text shown in a mission picker: locked missions list what they wait on.
    pub fn label(&self) -> String {
        if self.available {
            self.name.clone()
        } else {
            let needs: Vec<&str> = self.requires_activation.iter().map(String::as_str).collect();
            format!("{} (locked: {})", self.name, needs.join(", "))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerceptionModule {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub togglable: bool,
}

/// Declared vehicle hardware. The endpoint's schema is open-ended, so keys are
/// kept as raw json and looked up by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hardware(pub Map<String, Value>);

impl Hardware {
    pub fn flag(&self, key: &str) -> bool {
        match self.0.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
            Some(Value::String(s)) => {
                let s = s.trim();
                ["true", "yes", "1"].iter().any(|t| s.eq_ignore_ascii_case(t))
            }
            Some(Value::Object(o)) => match o.get("present").or_else(|| o.get("available")) {
                Some(Value::Bool(b)) => *b,
                _ => !o.is_empty(),
            },
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Null) | None => false,
        }
    }

    pub fn has_point_cloud_sensor(&self) -> bool {
        self.flag("lidar") || self.flag("depth_camera")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CapabilitiesError {
    #[error("capabilities response is not valid json: {0}")]
    Envelope(#[source] serde_json::Error),
    #[error("capabilities payload is not valid json: {0}")]
    Inner(#[source] serde_json::Error),
    #[error("`missions` must be an array or an object")]
    MissionsShape,
}

#[derive(Deserialize)]
struct Envelope {
    capabilities: String,
}

#[derive(Deserialize)]
struct RawCapabilities {
    #[serde(default)]
    missions: Value,
    #[serde(default)]
    perception_modules: BTreeMap<String, PerceptionModule>,
    #[serde(default)]
    hardware: Hardware,
}

/// Parsed capability listing, missions keyed by lower-cased name.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    missions: Vec<MissionDescriptor>,
    index: HashMap<String, usize>,
    pub perception_modules: BTreeMap<String, PerceptionModule>,
    pub hardware: Hardware,
    /// Listing entries that could not be used, with the reason.
    pub rejected: Vec<String>,
}

impl Capabilities {
    /// Parses the `GET /capabilities` body: `{"capabilities": "<json string>"}`.
    pub fn from_response(body: &str) -> Result<Self, CapabilitiesError> {
        let env: Envelope = serde_json::from_str(body).map_err(CapabilitiesError::Envelope)?;
        Self::from_json(&env.capabilities)
    }

    pub fn from_json(inner: &str) -> Result<Self, CapabilitiesError> {
        let raw: RawCapabilities = serde_json::from_str(inner).map_err(CapabilitiesError::Inner)?;

        let entries: Vec<Value> = match raw.missions {
            Value::Array(list) => list,
            Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
            Value::Null => Vec::new(),
            _ => return Err(CapabilitiesError::MissionsShape),
        };

        let mut caps = Capabilities {
            perception_modules: raw.perception_modules,
            hardware: raw.hardware,
            ..Default::default()
        };
        for entry in entries {
            match serde_json::from_value::<MissionDescriptor>(entry) {
                Ok(m) => caps.insert(m),
                Err(e) => caps.rejected.push(format!("mission entry skipped: {}", e)),
            }
        }
        Ok(caps)
    }

    fn insert(&mut self, mission: MissionDescriptor) {
        let key = mission.name.to_lowercase();
        match self.index.get(&key) {
            Some(&i) => {
                self.rejected.push(format!("duplicate mission name `{}` replaces earlier entry", mission.name));
                self.missions[i] = mission;
            }
            None => {
                self.index.insert(key, self.missions.len());
                self.missions.push(mission);
            }
        }
    }

    pub fn mission(&self, name: &str) -> Option<&MissionDescriptor> {
        self.index.get(&name.trim().to_lowercase()).map(|&i| &self.missions[i])
    }

    /// Missions in listing order.
    pub fn missions(&self) -> &[MissionDescriptor] {
        &self.missions
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DemBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl DemBounds {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lon..=self.max_lon).contains(&lon)
    }
}

/// One catalogued terrain model from `GET /dems`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemEntry {
    pub filename: String,
    #[serde(default)]
    pub bounds: Option<DemBounds>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_envelope_with_mission_array() {
        let inner = r#"{"missions":[
            {"name":"Survey","available":true,"geometry_type":"polygon"},
            {"name":"Goto","geometry_type":"point"},
            {"name":"Inspect","available":false,"geometry_type":null,"requires_activation":["lidar","slam"]}
        ],"perception_modules":{"slam":{"active":false,"togglable":true}},"hardware":{"lidar":true}}"#;
        let body = serde_json::json!({ "capabilities": inner }).to_string();
        let caps = Capabilities::from_response(&body).unwrap();

        assert_eq!(caps.missions().len(), 3);
        assert_eq!(caps.mission("survey").unwrap().geometry_type, GeometryType::Polygon);
        assert!(caps.mission("GOTO").unwrap().available);
        let inspect = caps.mission("Inspect").unwrap();
        assert_eq!(inspect.geometry_type, GeometryType::None);
        assert_eq!(inspect.label(), "Inspect (locked: lidar, slam)");
        assert!(caps.perception_modules["slam"].togglable);
        assert!(caps.hardware.has_point_cloud_sensor());
        assert!(caps.rejected.is_empty());
    }

    #[test]
    fn accepts_mission_map_and_skips_bad_entries() {
        let inner = r#"{"missions":{
            "a":{"name":"Orbit","geometry_type":"point"},
            "b":{"name":"Weird","geometry_type":"sphere"},
            "c":{"name":"orbit","geometry_type":"polyline"}
        }}"#;
        let caps = Capabilities::from_json(inner).unwrap();
        assert_eq!(caps.missions().len(), 1);
        assert_eq!(caps.mission("Orbit").unwrap().geometry_type, GeometryType::Polyline);
        assert_eq!(caps.rejected.len(), 2);
        assert!(!caps.hardware.has_point_cloud_sensor());
    }

    #[test]
    fn rejects_scalar_missions() {
        assert!(matches!(
            Capabilities::from_json(r#"{"missions":3}"#),
            Err(CapabilitiesError::MissionsShape)
        ));
    }

    #[test]
    fn dem_bounds() {
        let dems: Vec<DemEntry> = serde_json::from_str(
            r#"[{"filename":"field.tif","bounds":{"min_lat":37.0,"max_lat":38.0,"min_lon":-123.0,"max_lon":-122.0}},
                {"filename":"loose.tif"}]"#,
        )
        .unwrap();
        assert!(dems[0].bounds.unwrap().contains(37.42, -122.08));
        assert!(!dems[0].bounds.unwrap().contains(39.0, -122.08));
        assert_eq!(dems[1].bounds, None);
    }

    #[test]
    fn string_flags_need_an_affirmative_word() {
        let hw: Hardware = serde_json::from_str(
            r#"{"lidar":"false","depth_camera":"no","gps":"0","rtk":"","camera":"Yes","imu":" true ","baro":"1"}"#,
        )
        .unwrap();
        for key in ["lidar", "depth_camera", "gps", "rtk"] {
            assert!(!hw.flag(key), "{}", key);
        }
        for key in ["camera", "imu", "baro"] {
            assert!(hw.flag(key), "{}", key);
        }
        assert!(!hw.has_point_cloud_sensor());
    }
}
