use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, info};

use crate::{
    config::{ClimateEntryConfig, ConfigError},
    lifecycle::{ClimateController, ControllerSnapshot},
    ports::{Host, TimerId},
    types::EntityState,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
    #[error("entry {0} is already set up")]
    DuplicateEntry(String),
    #[error("{climate_entity_id} is already controlled by entry {entry_id}")]
    ClimateEntityInUse {
        climate_entity_id: String,
        entry_id: String,
    },
    #[error("entry {0} is not set up")]
    UnknownEntry(String),
    #[error("entry {entry_id} controls {expected}, not {actual}")]
    WrongClimateEntity {
        entry_id: String,
        expected: String,
        actual: String,
    },
}

#[derive(Debug)]
pub struct ControllerRegistry<T> {
    controllers: BTreeMap<String, ClimateController<T>>,
    system_ready: bool,
}

impl<T> Default for ControllerRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ControllerRegistry<T> {
    pub fn new() -> Self {
        Self {
            controllers: BTreeMap::new(),
            system_ready: false,
        }
    }

    pub fn is_system_ready(&self) -> bool {
        self.system_ready
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    pub fn get(&self, entry_id: &str) -> Option<&ClimateController<T>> {
        self.controllers.get(entry_id)
    }

    // Sorted, so subscriptions come out in a stable order.
    pub fn referenced_entities(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .controllers
            .values()
            .flat_map(|controller| {
                let config = controller.config();
                [
                    config.climate_entity_id.as_str(),
                    config.temperature_sensor_id.as_str(),
                    config.humidity_sensor_id.as_str(),
                ]
            })
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub fn setup_entry<H: Host<Timer = T>>(
        &mut self,
        host: &mut H,
        config: ClimateEntryConfig,
    ) -> Result<(), RegistryError> {
        config.validate()?;

        if self.controllers.contains_key(&config.entry_id) {
            return Err(RegistryError::DuplicateEntry(config.entry_id));
        }
        if let Some(existing) = self
            .controllers
            .values()
            .find(|controller| controller.config().climate_entity_id == config.climate_entity_id)
        {
            return Err(RegistryError::ClimateEntityInUse {
                climate_entity_id: config.climate_entity_id,
                entry_id: existing.entry_id().to_string(),
            });
        }

        info!("setting up entry {}", config.entry_id);
        let entry_id = config.entry_id.clone();
        let mut controller = ClimateController::new(config);
        if self.system_ready {
            controller.on_system_ready(host);
        }
        self.controllers.insert(entry_id, controller);
        Ok(())
    }

    pub fn unload_entry<H: Host<Timer = T>>(
        &mut self,
        host: &mut H,
        entry_id: &str,
    ) -> Result<ClimateEntryConfig, RegistryError> {
        let mut controller = self
            .controllers
            .remove(entry_id)
            .ok_or_else(|| RegistryError::UnknownEntry(entry_id.to_string()))?;
        info!("unloading entry {entry_id}");
        controller.shutdown(host);
        Ok(controller.config().clone())
    }

    pub fn reconfigure_entry<H: Host<Timer = T>>(
        &mut self,
        host: &mut H,
        config: ClimateEntryConfig,
    ) -> Result<(), RegistryError> {
        config.validate()?;

        let Some(existing) = self.controllers.get(&config.entry_id) else {
            return Err(RegistryError::UnknownEntry(config.entry_id));
        };
        if existing.config().climate_entity_id != config.climate_entity_id {
            return Err(RegistryError::WrongClimateEntity {
                entry_id: config.entry_id,
                expected: existing.config().climate_entity_id.clone(),
                actual: config.climate_entity_id,
            });
        }

        self.unload_entry(host, &config.entry_id)?;
        self.setup_entry(host, config)
    }

    pub fn on_system_ready<H: Host<Timer = T>>(&mut self, host: &mut H) {
        if self.system_ready {
            debug!("system ready already handled");
            return;
        }
        self.system_ready = true;
        info!("system ready, checking {} entries", self.controllers.len());
        for controller in self.controllers.values_mut() {
            controller.on_system_ready(host);
        }
    }

    pub fn on_state_change<H: Host<Timer = T>>(
        &mut self,
        host: &mut H,
        entity_id: &str,
        old: Option<&EntityState>,
        new: Option<&EntityState>,
    ) {
        for controller in self
            .controllers
            .values_mut()
            .filter(|controller| controller.config().climate_entity_id == entity_id)
        {
            controller.on_unit_state_change(host, old, new);
        }
    }

    pub fn on_tick<H: Host<Timer = T>>(
        &mut self,
        host: &mut H,
        entry_id: &str,
        timer_id: TimerId,
    ) {
        match self.controllers.get_mut(entry_id) {
            Some(controller) => controller.on_tick(host, timer_id),
            None => debug!("tick for unknown entry {entry_id}"),
        }
    }

    pub fn shutdown<H: Host<Timer = T>>(&mut self, host: &mut H) {
        for (_, mut controller) in std::mem::take(&mut self.controllers) {
            controller.shutdown(host);
        }
    }

    pub fn snapshots(&self) -> Vec<ControllerSnapshot> {
        self.controllers
            .values()
            .map(ClimateController::snapshot)
            .collect()
    }
}
