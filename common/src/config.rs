use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::CLIMATE_DOMAIN;

pub const DEFAULT_TARGET_TEMPERATURE: f64 = 22.0;
pub const DEFAULT_TARGET_HUMIDITY: f64 = 60.0;

pub const TARGET_TEMPERATURE_RANGE: RangeInclusive<f64> = 18.0..=30.0;
pub const TARGET_HUMIDITY_RANGE: RangeInclusive<f64> = 50.0..=70.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("entry id cannot be empty")]
    EmptyEntryId,
    #[error("{field}: invalid entity id '{value}'")]
    InvalidEntityId { field: &'static str, value: String },
    #[error("climate_entity_id: '{0}' is not a climate entity")]
    NotClimateEntity(String),
    #[error("{field}: {value} is outside {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimateEntryConfig {
    pub entry_id: String,
    pub climate_entity_id: String,
    pub temperature_sensor_id: String,
    pub humidity_sensor_id: String,
    #[serde(default = "default_target_temperature")]
    pub target_temperature: f64,
    #[serde(default = "default_target_humidity")]
    pub target_humidity: f64,
}

fn default_target_temperature() -> f64 {
    DEFAULT_TARGET_TEMPERATURE
}

fn default_target_humidity() -> f64 {
    DEFAULT_TARGET_HUMIDITY
}

impl ClimateEntryConfig {
    pub fn new(
        entry_id: impl Into<String>,
        climate_entity_id: impl Into<String>,
        temperature_sensor_id: impl Into<String>,
        humidity_sensor_id: impl Into<String>,
    ) -> Self {
        Self {
            entry_id: entry_id.into(),
            climate_entity_id: climate_entity_id.into(),
            temperature_sensor_id: temperature_sensor_id.into(),
            humidity_sensor_id: humidity_sensor_id.into(),
            target_temperature: DEFAULT_TARGET_TEMPERATURE,
            target_humidity: DEFAULT_TARGET_HUMIDITY,
        }
    }

    pub fn with_targets(mut self, target_temperature: f64, target_humidity: f64) -> Self {
        self.target_temperature = target_temperature;
        self.target_humidity = target_humidity;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.entry_id.trim().is_empty() {
            return Err(ConfigError::EmptyEntryId);
        }

        check_entity_id("climate_entity_id", &self.climate_entity_id)?;
        check_entity_id("temperature_sensor_id", &self.temperature_sensor_id)?;
        check_entity_id("humidity_sensor_id", &self.humidity_sensor_id)?;

        if entity_domain(&self.climate_entity_id) != Some(CLIMATE_DOMAIN) {
            return Err(ConfigError::NotClimateEntity(
                self.climate_entity_id.clone(),
            ));
        }

        check_range(
            "target_temperature",
            self.target_temperature,
            &TARGET_TEMPERATURE_RANGE,
        )?;
        check_range(
            "target_humidity",
            self.target_humidity,
            &TARGET_HUMIDITY_RANGE,
        )?;

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    pub client_id: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1883,
            user: String::new(),
            pass: String::new(),
            client_id: "smarter-climate".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_ready_grace_secs")]
    pub ready_grace_secs: u64,
    #[serde(default)]
    pub entries: Vec<ClimateEntryConfig>,
}

fn default_topic_prefix() -> String {
    "homeassistant".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_ready_grace_secs() -> u64 {
    30
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttConfig::default(),
            topic_prefix: default_topic_prefix(),
            http_port: default_http_port(),
            ready_grace_secs: default_ready_grace_secs(),
            entries: Vec::new(),
        }
    }
}

pub fn entity_domain(entity_id: &str) -> Option<&str> {
    entity_id.split_once('.').map(|(domain, _)| domain)
}

pub fn is_valid_entity_id(entity_id: &str) -> bool {
    let Some((domain, object_id)) = entity_id.split_once('.') else {
        return false;
    };
    is_slug(domain) && is_slug(object_id)
}

fn is_slug(part: &str) -> bool {
    !part.is_empty()
        && !part.starts_with('_')
        && !part.ends_with('_')
        && part
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn check_entity_id(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if is_valid_entity_id(value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidEntityId {
            field,
            value: value.to_string(),
        })
    }
}

fn check_range(
    field: &'static str,
    value: f64,
    range: &RangeInclusive<f64>,
) -> Result<(), ConfigError> {
    if value.is_finite() && range.contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min: *range.start(),
            max: *range.end(),
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn entry() -> ClimateEntryConfig {
        ClimateEntryConfig::new(
            "living_room",
            "climate.living_room",
            "sensor.living_room_temperature",
            "sensor.living_room_humidity",
        )
    }

    #[test]
    fn defaults_are_applied_when_targets_are_omitted() {
        let raw = r#"{
            "entry_id": "a",
            "climate_entity_id": "climate.a",
            "temperature_sensor_id": "sensor.t",
            "humidity_sensor_id": "sensor.h"
        }"#;
        let parsed: ClimateEntryConfig = serde_json::from_str(raw).unwrap();

        assert_eq!(parsed.target_temperature, DEFAULT_TARGET_TEMPERATURE);
        assert_eq!(parsed.target_humidity, DEFAULT_TARGET_HUMIDITY);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn entity_ids_must_be_domain_dot_object() {
        assert!(is_valid_entity_id("sensor.outdoor_temp_2"));
        assert!(!is_valid_entity_id("sensor"));
        assert!(!is_valid_entity_id("sensor."));
        assert!(!is_valid_entity_id("Sensor.temp"));
        assert!(!is_valid_entity_id("sensor.temp.extra"));
        assert!(!is_valid_entity_id("sensor._temp"));

        let mut config = entry();
        config.humidity_sensor_id = "humidity".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidEntityId {
                field: "humidity_sensor_id",
                value: "humidity".to_string(),
            })
        );
    }

    #[test]
    fn controlled_entity_must_be_climate() {
        let mut config = entry();
        config.climate_entity_id = "switch.heater".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::NotClimateEntity("switch.heater".to_string()))
        );
    }

    #[test]
    fn targets_are_range_checked() {
        assert!(entry().with_targets(18.0, 70.0).validate().is_ok());
        assert!(entry().with_targets(30.0, 50.0).validate().is_ok());

        assert!(matches!(
            entry().with_targets(31.0, 60.0).validate(),
            Err(ConfigError::OutOfRange {
                field: "target_temperature",
                ..
            })
        ));
        assert!(matches!(
            entry().with_targets(22.0, 45.0).validate(),
            Err(ConfigError::OutOfRange {
                field: "target_humidity",
                ..
            })
        ));
        assert!(entry().with_targets(f64::NAN, 60.0).validate().is_err());
    }

    #[test]
    fn empty_controller_config_parses_to_defaults() {
        let parsed: ControllerConfig = serde_json::from_str("{}").unwrap();

        assert_eq!(parsed.topic_prefix, "homeassistant");
        assert_eq!(parsed.http_port, 8080);
        assert_eq!(parsed.mqtt.port, 1883);
        assert!(parsed.entries.is_empty());
    }
}
