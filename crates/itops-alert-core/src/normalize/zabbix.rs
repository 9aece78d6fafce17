// ── Zabbix webhook payloads ──
//
// Two spellings are accepted: the native media-type document
// (`event_name`, `event_severity`, `occur_time`, ...) and the compact
// form (`host`, `severity`, `status`, `clock`). Times without a zone
// are read as UTC.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::CoreError;
use crate::model::{EventStatus, RawEvent, Severity, entity_key};

use super::SourceKind;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ZabbixWebhook {
    #[serde(deserialize_with = "loose_string")]
    description: String,
    #[serde(deserialize_with = "loose_string")]
    event_id: String,
    #[serde(deserialize_with = "loose_string")]
    recovery_id: String,
    #[serde(alias = "title", deserialize_with = "loose_string")]
    event_name: String,
    #[serde(deserialize_with = "loose_string")]
    occur_time: String,
    #[serde(deserialize_with = "loose_string")]
    recovery_time: String,
    #[serde(alias = "severity", deserialize_with = "loose_string")]
    event_severity: String,
    #[serde(alias = "status", deserialize_with = "loose_string")]
    event_status: String,
    #[serde(alias = "host", deserialize_with = "loose_string")]
    entity_object_name: String,
    #[serde(deserialize_with = "loose_string")]
    ip: String,
    #[serde(deserialize_with = "loose_string")]
    item_key: String,
    #[serde(deserialize_with = "loose_string")]
    clock: String,
    #[serde(deserialize_with = "loose_string")]
    k8s_cluster: String,
    #[serde(deserialize_with = "loose_string")]
    namespace: String,
}

/// Accept strings, numbers, bools and null where a string is expected.
fn loose_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s.trim().to_owned(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

/// A parsed webhook plus the directory key for its host.
#[derive(Debug)]
pub(crate) struct Parsed {
    pub event: RawEvent,
    pub entity_key: Option<String>,
}

/// `document` is the decoded JSON object; `payload` the original bytes.
pub(crate) fn parse(
    document: &Value,
    payload: &[u8],
    now: DateTime<Utc>,
) -> Result<Parsed, CoreError> {
    let webhook = ZabbixWebhook::deserialize(document).map_err(|e| CoreError::Normalize {
        message: format!("invalid zabbix webhook: {e}"),
    })?;

    let occur_time = parse_time(&webhook.occur_time);
    let recovery_time = parse_time(&webhook.recovery_time);
    let clock = parse_clock(&webhook.clock);
    let status = map_status(&webhook.event_status);

    let event_timestamp = match status {
        EventStatus::Recovered => recovery_time.or(clock),
        EventStatus::Occurred => occur_time.or(clock),
    }
    .unwrap_or(now);

    let event_type = if webhook.item_key.is_empty() {
        webhook.event_name.clone()
    } else {
        webhook.item_key.clone()
    };

    let entity_key = (!webhook.entity_object_name.is_empty()).then(|| {
        entity_key(
            &webhook.k8s_cluster,
            &webhook.namespace,
            &webhook.entity_object_name,
        )
    });

    let event = RawEvent {
        recovery_id: webhook.recovery_id.parse().unwrap_or(0),
        event_provider_id: webhook.event_id.parse().unwrap_or(0),
        event_timestamp,
        event_title: webhook.event_name,
        event_content: webhook.description,
        event_occur_time: occur_time,
        event_recovery_time: recovery_time,
        event_type,
        event_status: status,
        event_level: map_severity(&webhook.event_severity),
        event_source: SourceKind::ZabbixWebhook.to_string(),
        entity_object_name: webhook.entity_object_name,
        entity_object_ip: webhook.ip,
        raw_event_msg: String::from_utf8_lossy(payload).into_owned(),
        ..RawEvent::default()
    };

    Ok(Parsed { event, entity_key })
}

// ── Field mapping ────────────────────────────────────────────────────

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }
    NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT)
        .map(|naive| naive.and_utc())
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|t| t.with_timezone(&Utc)))
}

fn parse_clock(raw: &str) -> Option<DateTime<Utc>> {
    let secs: i64 = raw.parse().ok()?;
    DateTime::from_timestamp(secs, 0)
}

pub(crate) fn map_status(raw: &str) -> EventStatus {
    match raw.to_ascii_lowercase().as_str() {
        "恢复" | "resolved" | "ok" | "recovered" | "recovery" => EventStatus::Recovered,
        _ => EventStatus::Occurred,
    }
}

pub(crate) fn map_severity(raw: &str) -> Severity {
    if let Ok(code) = raw.parse::<u8>() {
        return Severity::try_from(code).unwrap_or_default();
    }
    match raw.to_ascii_lowercase().as_str() {
        "disaster" => Severity::Emergency,
        "high" => Severity::Critical,
        "average" => Severity::Major,
        "warning" => Severity::Warning,
        _ => Severity::Normal,
    }
}
