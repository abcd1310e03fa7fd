use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    config::ClimateEntryConfig,
    decision::{decide, Decision},
    ports::{Host, TimerId},
    types::{EntityState, PowerState},
};

pub const EVALUATION_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadingError {
    #[error("{0} has no state")]
    Missing(String),
    #[error("{0} is unknown or unavailable")]
    Unavailable(String),
    #[error("could not parse reading from {entity_id}: '{value}'")]
    Unparsable { entity_id: String, value: String },
}

pub fn read_sensor<H: Host>(host: &H, entity_id: &str) -> Result<f64, ReadingError> {
    let Some(state) = host.entity_state(entity_id) else {
        return Err(ReadingError::Missing(entity_id.to_string()));
    };
    if state.is_unknown_or_unavailable() {
        return Err(ReadingError::Unavailable(entity_id.to_string()));
    }

    state
        .value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| ReadingError::Unparsable {
            entity_id: entity_id.to_string(),
            value: state.value.clone(),
        })
}

#[derive(Debug)]
struct ControllerState<T> {
    unit_on: bool,
    // Present iff `unit_on`.
    timer: Option<(TimerId, T)>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRecord {
    pub at: DateTime<Utc>,
    pub temperature: f64,
    pub humidity: f64,
    pub decision: Decision,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerSnapshot {
    pub entry_id: String,
    pub climate_entity_id: String,
    pub temperature_sensor_id: String,
    pub humidity_sensor_id: String,
    pub target_temperature: f64,
    pub target_humidity: f64,
    pub unit_on: bool,
    pub timer_active: bool,
    pub evaluations: u64,
    pub skipped_evaluations: u64,
    pub last_decision: Option<DecisionRecord>,
}

/// Drives one climate entity from its two sensors. Every handler takes the
/// host explicitly.
#[derive(Debug)]
pub struct ClimateController<T> {
    config: ClimateEntryConfig,
    state: ControllerState<T>,
    last_decision: Option<DecisionRecord>,
    evaluations: u64,
    skipped_evaluations: u64,
}

impl<T> ClimateController<T> {
    pub fn new(config: ClimateEntryConfig) -> Self {
        info!(
            "controller {} created for climate: {}, temp: {}, hum: {}, target_temp: {}, target_hum: {}",
            config.entry_id,
            config.climate_entity_id,
            config.temperature_sensor_id,
            config.humidity_sensor_id,
            config.target_temperature,
            config.target_humidity,
        );
        Self {
            config,
            state: ControllerState {
                unit_on: false,
                timer: None,
            },
            last_decision: None,
            evaluations: 0,
            skipped_evaluations: 0,
        }
    }

    pub fn config(&self) -> &ClimateEntryConfig {
        &self.config
    }

    pub fn entry_id(&self) -> &str {
        &self.config.entry_id
    }

    pub fn is_unit_on(&self) -> bool {
        self.state.unit_on
    }

    pub fn is_timer_active(&self) -> bool {
        self.state.timer.is_some()
    }

    pub fn timer_id(&self) -> Option<TimerId> {
        self.state.timer.as_ref().map(|(id, _)| *id)
    }

    pub fn last_decision(&self) -> Option<&DecisionRecord> {
        self.last_decision.as_ref()
    }

    pub fn on_system_ready<H: Host<Timer = T>>(&mut self, host: &mut H) {
        let current = host.entity_state(&self.config.climate_entity_id);
        match PowerState::from_entity(current.as_ref()) {
            Some(PowerState::On) => {
                debug!(
                    "{} is already on at startup",
                    self.config.climate_entity_id
                );
                self.handle_turned_on(host);
            }
            _ => {
                debug!(
                    "{} is not on at startup, waiting for it to turn on",
                    self.config.climate_entity_id
                );
                self.stop_timer(host);
                self.state.unit_on = false;
            }
        }
    }

    pub fn on_unit_state_change<H: Host<Timer = T>>(
        &mut self,
        host: &mut H,
        old: Option<&EntityState>,
        new: Option<&EntityState>,
    ) {
        let Some(power) = PowerState::from_entity(new) else {
            debug!(
                "{} state is missing, unknown or unavailable, ignoring",
                self.config.climate_entity_id
            );
            return;
        };

        match (self.state.unit_on, power) {
            (false, PowerState::On) => {
                info!(
                    "{} turned on ({:?} -> {:?})",
                    self.config.climate_entity_id,
                    old.map(|state| state.value.as_str()),
                    new.map(|state| state.value.as_str()),
                );
                self.handle_turned_on(host);
            }
            (true, PowerState::Off) => {
                info!("{} turned off", self.config.climate_entity_id);
                self.handle_turned_off(host);
            }
            _ => {}
        }
    }

    pub fn on_tick<H: Host<Timer = T>>(&mut self, host: &mut H, timer_id: TimerId) {
        if !self.state.unit_on || self.timer_id() != Some(timer_id) {
            debug!(
                "ignoring stale tick {} for {}",
                timer_id, self.config.entry_id
            );
            return;
        }
        self.evaluate(host);
    }

    /// Returns the decision that was executed, `None` when a reading was
    /// unusable.
    pub fn evaluate<H: Host<Timer = T>>(&mut self, host: &mut H) -> Option<Decision> {
        let readings = read_sensor(&*host, &self.config.temperature_sensor_id).and_then(
            |temperature| {
                read_sensor(&*host, &self.config.humidity_sensor_id)
                    .map(|humidity| (temperature, humidity))
            },
        );

        let (temperature, humidity) = match readings {
            Ok(readings) => readings,
            Err(err) => {
                match &err {
                    ReadingError::Unparsable { .. } => warn!("{err}"),
                    _ => debug!("{err}, skipping climate control"),
                }
                self.skipped_evaluations = self.skipped_evaluations.saturating_add(1);
                return None;
            }
        };

        let decision = decide(
            temperature,
            humidity,
            self.config.target_temperature,
            self.config.target_humidity,
        );
        info!(
            "{}: temp {} (target {}), hum {} (target {}) -> {:?} [{:?}]",
            self.config.climate_entity_id,
            temperature,
            self.config.target_temperature,
            humidity,
            self.config.target_humidity,
            decision.action,
            decision.reason,
        );

        for call in decision
            .action
            .service_calls(&self.config.climate_entity_id)
        {
            host.call_service(call);
        }

        self.evaluations = self.evaluations.saturating_add(1);
        self.last_decision = Some(DecisionRecord {
            at: host.now(),
            temperature,
            humidity,
            decision,
        });
        Some(decision)
    }

    pub fn shutdown<H: Host<Timer = T>>(&mut self, host: &mut H) {
        self.stop_timer(host);
        self.state.unit_on = false;
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            entry_id: self.config.entry_id.clone(),
            climate_entity_id: self.config.climate_entity_id.clone(),
            temperature_sensor_id: self.config.temperature_sensor_id.clone(),
            humidity_sensor_id: self.config.humidity_sensor_id.clone(),
            target_temperature: self.config.target_temperature,
            target_humidity: self.config.target_humidity,
            unit_on: self.state.unit_on,
            timer_active: self.state.timer.is_some(),
            evaluations: self.evaluations,
            skipped_evaluations: self.skipped_evaluations,
            last_decision: self.last_decision.clone(),
        }
    }

    fn handle_turned_on<H: Host<Timer = T>>(&mut self, host: &mut H) {
        self.state.unit_on = true;
        self.evaluate(host);
        self.start_timer(host);
    }

    fn handle_turned_off<H: Host<Timer = T>>(&mut self, host: &mut H) {
        self.stop_timer(host);
        self.state.unit_on = false;
    }

    fn start_timer<H: Host<Timer = T>>(&mut self, host: &mut H) {
        if self.state.timer.is_some() {
            return;
        }
        let timer = host.schedule_recurring(&self.config.entry_id, EVALUATION_INTERVAL);
        self.state.timer = Some((H::timer_id(&timer), timer));
        debug!(
            "periodic evaluation started for {} every {}s",
            self.config.entry_id,
            EVALUATION_INTERVAL.as_secs()
        );
    }

    fn stop_timer<H: Host<Timer = T>>(&mut self, host: &mut H) {
        if let Some((_, timer)) = self.state.timer.take() {
            host.cancel(timer);
            debug!("periodic evaluation stopped for {}", self.config.entry_id);
        }
    }
}
