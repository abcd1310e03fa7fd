use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const STATE_UNKNOWN: &str = "unknown";
pub const STATE_UNAVAILABLE: &str = "unavailable";

pub const CLIMATE_DOMAIN: &str = "climate";
pub const SERVICE_SET_HVAC_MODE: &str = "set_hvac_mode";
pub const SERVICE_SET_TEMPERATURE: &str = "set_temperature";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HvacMode {
    Off,
    Cool,
    Heat,
    Dry,
}

impl HvacMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Cool => "cool",
            Self::Heat => "heat",
            Self::Dry => "dry",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityState {
    pub value: String,
}

impl EntityState {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    pub fn is_unknown_or_unavailable(&self) -> bool {
        self.value == STATE_UNKNOWN || self.value == STATE_UNAVAILABLE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PowerState {
    On,
    Off,
}

impl PowerState {
    /// Classifies a climate entity state. `None` when the state is missing,
    /// unknown or unavailable.
    pub fn from_entity(state: Option<&EntityState>) -> Option<Self> {
        let state = state?;
        if state.is_unknown_or_unavailable() {
            return None;
        }
        if state.value == HvacMode::Off.as_str() {
            Some(Self::Off)
        } else {
            Some(Self::On)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,
    pub data: Map<String, Value>,
    pub blocking: bool,
}

impl ServiceCall {
    pub fn set_hvac_mode(entity_id: &str, mode: HvacMode) -> Self {
        let mut data = Map::new();
        data.insert("entity_id".to_string(), Value::from(entity_id));
        data.insert("hvac_mode".to_string(), Value::from(mode.as_str()));
        Self {
            domain: CLIMATE_DOMAIN.to_string(),
            service: SERVICE_SET_HVAC_MODE.to_string(),
            data,
            blocking: false,
        }
    }

    pub fn set_temperature(entity_id: &str, temperature: f64) -> Self {
        let mut data = Map::new();
        data.insert("entity_id".to_string(), Value::from(entity_id));
        data.insert("temperature".to_string(), Value::from(temperature));
        Self {
            domain: CLIMATE_DOMAIN.to_string(),
            service: SERVICE_SET_TEMPERATURE.to_string(),
            data,
            blocking: false,
        }
    }

    pub fn hvac_mode(&self) -> Option<&str> {
        self.data.get("hvac_mode").and_then(Value::as_str)
    }

    pub fn temperature(&self) -> Option<f64> {
        self.data.get("temperature").and_then(Value::as_f64)
    }
}
