// ── Generic source: documents already in canonical field names ──

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::CoreError;
use crate::model::{RawEvent, entity_key};

use super::SourceKind;
use super::zabbix::Parsed;

pub(crate) fn parse(
    document: &Value,
    payload: &[u8],
    now: DateTime<Utc>,
) -> Result<Parsed, CoreError> {
    let mut event = RawEvent::deserialize(document).map_err(|e| CoreError::Normalize {
        message: format!("invalid generic event: {e}"),
    })?;

    // Assignment is ours, never the producer's.
    event.event_id = 0;
    event.fault_id = 0;
    event.problem_id = 0;

    if event.event_timestamp == DateTime::<Utc>::default() {
        event.event_timestamp = event.event_occur_time.unwrap_or(now);
    }
    if event.event_source.is_empty() {
        event.event_source = SourceKind::Generic.to_string();
    }
    if event.event_type.is_empty() {
        event.event_type.clone_from(&event.event_title);
    }
    event.raw_event_msg = String::from_utf8_lossy(payload).into_owned();

    // A producer that already knows the entity id skips the directory.
    let entity_key = (event.entity_object_id.is_empty() && !event.entity_object_name.is_empty())
        .then(|| entity_key("", "", &event.entity_object_name));

    Ok(Parsed { event, entity_key })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{EventStatus, Severity};

    #[test]
    fn canonical_fields_pass_through() {
        let body = br#"{
            "event_title": "Link down",
            "event_status": "2",
            "event_level": 1,
            "event_timestamp": "2025-06-01T10:00:00Z",
            "entity_object_id": "sw-7",
            "entity_object_class": "switch",
            "fault_id": 99
        }"#;
        let document: Value = serde_json::from_slice(body).unwrap();
        let parsed = parse(&document, body, Utc::now()).unwrap();

        assert!(parsed.entity_key.is_none());
        let event = parsed.event;
        assert_eq!(event.event_status, EventStatus::Recovered);
        assert_eq!(event.event_level, Severity::Emergency);
        assert_eq!(event.event_type, "Link down");
        assert_eq!(event.event_source, "generic");
        assert_eq!(event.fault_id, 0);
    }

    #[test]
    fn name_only_entities_are_resolved_later() {
        let body = br#"{"event_title": "x", "entity_object_name": "h1"}"#;
        let document: Value = serde_json::from_slice(body).unwrap();
        let now = Utc::now();
        let parsed = parse(&document, body, now).unwrap();
        assert_eq!(parsed.entity_key.as_deref(), Some("k8s_cluster:,namespace:,name:h1"));
        assert_eq!(parsed.event.event_timestamp, now);
    }

    #[test]
    fn bad_status_code_is_rejected() {
        let body = br#"{"event_status": "9"}"#;
        let document: Value = serde_json::from_slice(body).unwrap();
        assert!(matches!(
            parse(&document, body, Utc::now()),
            Err(CoreError::Normalize { .. })
        ));
    }
}
