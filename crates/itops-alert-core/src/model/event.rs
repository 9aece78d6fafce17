// ── Raw event domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::severity::Severity;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum EventStatus {
    #[default]
    #[serde(rename = "1")]
    Occurred,
    #[serde(rename = "2")]
    Recovered,
}

impl EventStatus {
    /// Stored code, as used in term queries.
    pub fn code(self) -> &'static str {
        match self {
            Self::Occurred => "1",
            Self::Recovered => "2",
        }
    }
}

/// One normalized alert record.
///
/// `fault_id` and `problem_id` are back-references filled in after the
/// event has been assigned; zero means unassigned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawEvent {
    pub event_id: u64,
    pub recovery_id: u64,
    pub event_provider_id: u64,
    pub event_timestamp: DateTime<Utc>,
    pub event_title: String,
    pub event_content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_occur_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_recovery_time: Option<DateTime<Utc>>,
    pub event_type: String,
    pub event_status: EventStatus,
    pub event_level: Severity,
    pub event_source: String,

    // Entity descriptor
    pub entity_object_name: String,
    pub entity_object_class: String,
    pub entity_object_id: String,
    pub entity_object_ip: String,
    pub entity_object_port: String,
    pub entity_object_mac: String,

    pub raw_event_msg: String,
    pub problem_id: u64,
    pub fault_id: u64,
}

impl RawEvent {
    /// Dedup key component alongside the entity id.
    pub fn fault_mode(&self) -> &str {
        &self.event_type
    }

    /// Whether the directory resolved an entity for this event.
    pub fn has_entity(&self) -> bool {
        !self.entity_object_id.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn status_uses_numeric_codes() {
        assert_eq!(serde_json::to_string(&EventStatus::Recovered).unwrap(), "\"2\"");
        assert_eq!(EventStatus::Occurred.code(), "1");
        assert_eq!(EventStatus::Recovered.to_string(), "recovered");
    }

    #[test]
    fn optional_times_are_omitted() {
        let event = RawEvent {
            event_id: 1,
            ..RawEvent::default()
        };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("event_occur_time").is_none());
        assert_eq!(json["event_status"], "1");
        assert_eq!(json["event_level"], 5);
        assert_eq!(json["fault_id"], 0);
    }
}
