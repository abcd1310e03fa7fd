use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::types::{EntityState, ServiceCall};

// Unique per host for its whole lifetime, so ticks from a cancelled timer
// never match the replacement.
pub type TimerId = u64;

pub trait Host {
    type Timer;

    fn entity_state(&self, entity_id: &str) -> Option<EntityState>;

    fn call_service(&mut self, call: ServiceCall);

    /// Each tick must be delivered back as
    /// `ControllerRegistry::on_tick(entry_id, timer_id)`.
    fn schedule_recurring(&mut self, entry_id: &str, interval: Duration) -> Self::Timer;

    fn timer_id(timer: &Self::Timer) -> TimerId;

    fn cancel(&mut self, timer: Self::Timer);

    fn now(&self) -> DateTime<Utc>;
}
