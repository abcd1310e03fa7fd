pub mod config;
pub mod decision;
pub mod lifecycle;
pub mod ports;
pub mod registry;
pub mod topics;
pub mod types;

pub use config::{ClimateEntryConfig, ConfigError, ControllerConfig, MqttConfig};
pub use decision::{decide, ClimateAction, Decision, DecisionReason};
pub use lifecycle::{
    read_sensor, ClimateController, ControllerSnapshot, DecisionRecord, ReadingError,
    EVALUATION_INTERVAL,
};
pub use ports::{Host, TimerId};
pub use registry::{ControllerRegistry, RegistryError};
pub use topics::*;
pub use types::{EntityState, HvacMode, PowerState, ServiceCall};
