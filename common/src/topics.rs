//! MQTT topic layout shared with the state bridge.
//!
//! Entity states live under `{prefix}/{domain}/{object_id}/state`, service
//! calls go to `{prefix}/service/{domain}/{service}` and the bridge announces
//! itself on `{prefix}/status`.

use crate::config::is_valid_entity_id;

pub const STATUS_ONLINE: &str = "online";

const STATE_SUFFIX: &str = "state";
const SERVICE_SEGMENT: &str = "service";

pub fn status_topic(prefix: &str) -> String {
    format!("{prefix}/status")
}

pub fn state_topic(prefix: &str, entity_id: &str) -> Option<String> {
    if !is_valid_entity_id(entity_id) {
        return None;
    }
    let (domain, object_id) = entity_id.split_once('.')?;
    Some(format!("{prefix}/{domain}/{object_id}/{STATE_SUFFIX}"))
}

pub fn entity_id_from_state_topic(prefix: &str, topic: &str) -> Option<String> {
    let rest = topic.strip_prefix(prefix)?.strip_prefix('/')?;
    let mut parts = rest.split('/');
    let (domain, object_id, suffix) = (parts.next()?, parts.next()?, parts.next()?);
    if suffix != STATE_SUFFIX || parts.next().is_some() {
        return None;
    }

    let entity_id = format!("{domain}.{object_id}");
    is_valid_entity_id(&entity_id).then_some(entity_id)
}

pub fn service_topic(prefix: &str, domain: &str, service: &str) -> String {
    format!("{prefix}/{SERVICE_SEGMENT}/{domain}/{service}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_topics_map_back_to_entity_ids() {
        let topic = state_topic("homeassistant", "sensor.living_room_temp").unwrap();
        assert_eq!(topic, "homeassistant/sensor/living_room_temp/state");
        assert_eq!(
            entity_id_from_state_topic("homeassistant", &topic).as_deref(),
            Some("sensor.living_room_temp")
        );
    }

    #[test]
    fn foreign_topics_are_not_entities() {
        let prefix = "homeassistant";
        assert_eq!(entity_id_from_state_topic(prefix, "homeassistant/status"), None);
        assert_eq!(
            entity_id_from_state_topic(prefix, "homeassistant/sensor/temp/attributes"),
            None
        );
        assert_eq!(
            entity_id_from_state_topic(prefix, "homeassistant/sensor/temp/state/extra"),
            None
        );
        assert_eq!(
            entity_id_from_state_topic(prefix, "other/sensor/temp/state"),
            None
        );
        assert_eq!(
            entity_id_from_state_topic(prefix, "homeassistantx/sensor/temp/state"),
            None
        );
    }

    #[test]
    fn invalid_entity_ids_have_no_state_topic() {
        assert_eq!(state_topic("ha", "not an entity"), None);
    }

    #[test]
    fn service_and_status_topics() {
        assert_eq!(
            service_topic("ha", "climate", "set_hvac_mode"),
            "ha/service/climate/set_hvac_mode"
        );
        assert_eq!(status_topic("ha"), "ha/status");
    }
}
