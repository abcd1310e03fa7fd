use serde::Serialize;

use crate::types::{HvacMode, ServiceCall};

pub const TEMPERATURE_BAND: f64 = 2.0;
pub const HUMIDITY_BAND: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ClimateAction {
    Cool { setpoint: f64 },
    Heat { setpoint: f64 },
    Dry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionReason {
    TooWarm,
    TooCold,
    TooHumid,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Decision {
    pub action: ClimateAction,
    pub reason: DecisionReason,
}

impl ClimateAction {
    pub fn mode(self) -> HvacMode {
        match self {
            Self::Cool { .. } => HvacMode::Cool,
            Self::Heat { .. } => HvacMode::Heat,
            Self::Dry => HvacMode::Dry,
        }
    }

    pub fn setpoint(self) -> Option<f64> {
        match self {
            Self::Cool { setpoint } | Self::Heat { setpoint } => Some(setpoint),
            Self::Dry => None,
        }
    }

    // Mode first, then the set-point.
    pub fn service_calls(self, climate_entity_id: &str) -> Vec<ServiceCall> {
        let mut calls = vec![ServiceCall::set_hvac_mode(climate_entity_id, self.mode())];
        if let Some(setpoint) = self.setpoint() {
            calls.push(ServiceCall::set_temperature(climate_entity_id, setpoint));
        }
        calls
    }
}

// First matching rule wins.
pub fn decide(
    current_temp: f64,
    current_humidity: f64,
    target_temp: f64,
    target_humidity: f64,
) -> Decision {
    if current_temp > target_temp + TEMPERATURE_BAND {
        Decision {
            action: ClimateAction::Cool {
                setpoint: target_temp,
            },
            reason: DecisionReason::TooWarm,
        }
    } else if current_temp < target_temp - TEMPERATURE_BAND {
        Decision {
            action: ClimateAction::Heat {
                setpoint: target_temp,
            },
            reason: DecisionReason::TooCold,
        }
    } else if current_humidity > target_humidity + HUMIDITY_BAND {
        Decision {
            action: ClimateAction::Dry,
            reason: DecisionReason::TooHumid,
        }
    } else {
        Decision {
            action: ClimateAction::Cool {
                setpoint: target_temp,
            },
            reason: DecisionReason::Default,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::types::{SERVICE_SET_HVAC_MODE, SERVICE_SET_TEMPERATURE};

    #[test]
    fn too_warm_cools_to_target() {
        let decision = decide(25.0, 40.0, 22.0, 50.0);
        assert_eq!(decision.action, ClimateAction::Cool { setpoint: 22.0 });
        assert_eq!(decision.reason, DecisionReason::TooWarm);
    }

    #[test]
    fn too_cold_heats_to_target() {
        let decision = decide(19.0, 40.0, 22.0, 50.0);
        assert_eq!(decision.action, ClimateAction::Heat { setpoint: 22.0 });
        assert_eq!(decision.reason, DecisionReason::TooCold);
    }

    #[test]
    fn humid_within_band_dries() {
        let decision = decide(22.5, 65.0, 22.0, 50.0);
        assert_eq!(decision.action, ClimateAction::Dry);
        assert_eq!(decision.reason, DecisionReason::TooHumid);
    }

    #[test]
    fn comfortable_defaults_to_cool() {
        let decision = decide(22.0, 45.0, 22.0, 50.0);
        assert_eq!(decision.action, ClimateAction::Cool { setpoint: 22.0 });
        assert_eq!(decision.reason, DecisionReason::Default);
    }

    #[test]
    fn temperature_rules_ignore_humidity() {
        for humidity in [0.0, 50.0, 61.0, 100.0] {
            assert_eq!(
                decide(30.0, humidity, 22.0, 50.0).action,
                ClimateAction::Cool { setpoint: 22.0 }
            );
            assert_eq!(
                decide(10.0, humidity, 22.0, 50.0).action,
                ClimateAction::Heat { setpoint: 22.0 }
            );
        }
    }

    #[test]
    fn band_edges_are_exclusive() {
        // Exactly +2.0 falls through to the humidity/default rules.
        assert_eq!(decide(24.0, 40.0, 22.0, 50.0).reason, DecisionReason::Default);
        assert_eq!(decide(24.0, 70.0, 22.0, 50.0).reason, DecisionReason::TooHumid);
        assert_eq!(decide(20.0, 40.0, 22.0, 50.0).reason, DecisionReason::Default);
        assert_eq!(decide(22.0, 60.0, 22.0, 50.0).reason, DecisionReason::Default);

        assert_eq!(decide(24.01, 40.0, 22.0, 50.0).reason, DecisionReason::TooWarm);
        assert_eq!(decide(19.99, 40.0, 22.0, 50.0).reason, DecisionReason::TooCold);
        assert_eq!(decide(22.0, 60.01, 22.0, 50.0).reason, DecisionReason::TooHumid);
    }

    #[test]
    fn cool_and_heat_expand_to_mode_then_setpoint() {
        let calls = ClimateAction::Heat { setpoint: 21.5 }.service_calls("climate.office");

        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].service, SERVICE_SET_HVAC_MODE);
        assert_eq!(calls[0].hvac_mode(), Some("heat"));
        assert_eq!(calls[1].service, SERVICE_SET_TEMPERATURE);
        assert_eq!(calls[1].temperature(), Some(21.5));
    }

    #[test]
    fn dry_issues_no_setpoint() {
        let calls = ClimateAction::Dry.service_calls("climate.office");

        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].hvac_mode(), Some("dry"));
        assert_eq!(calls[0].temperature(), None);
    }
}
