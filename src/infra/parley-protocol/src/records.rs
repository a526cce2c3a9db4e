use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Backend event as returned by `/events/get`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
    #[serde(default)]
    pub data: Value,
}

impl Event {
    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        self.timestamp.as_ref().and_then(Timestamp::to_utc)
    }
}

/// Event timestamps arrive either as RFC 3339 text or as unix seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Text(String),
    Unix(f64),
}

impl Timestamp {
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Text(raw) => DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            Self::Unix(secs) => {
                let whole = secs.trunc() as i64;
                let nanos = (secs.fract() * 1e9) as u32;
                Utc.timestamp_opt(whole, nanos).single()
            }
        }
    }
}

/// Backend task as returned by `/task/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub created_at: String,
}

/// Registered remote agent as returned by `/agent/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_reads_type_field() {
        let evt: Event = serde_json::from_value(json!({
            "id": "e1",
            "type": "task.update",
            "timestamp": "2025-01-02T03:04:05Z",
            "data": {"state": "working"},
        }))
        .unwrap();
        assert_eq!(evt.event_type, "task.update");
        let ts = evt.timestamp_utc().unwrap();
        assert_eq!(ts.timestamp(), 1_735_787_045);
    }

    #[test]
    fn event_accepts_unix_timestamp() {
        let evt: Event =
            serde_json::from_value(json!({"id": "e2", "type": "x", "timestamp": 1700000000.5}))
                .unwrap();
        assert_eq!(evt.timestamp_utc().unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn unparseable_timestamp_is_none() {
        let evt: Event =
            serde_json::from_value(json!({"id": "e3", "type": "x", "timestamp": "yesterday"}))
                .unwrap();
        assert!(evt.timestamp_utc().is_none());
        assert_eq!(evt.data, Value::Null);
    }

    #[test]
    fn agent_and_task_tolerate_missing_fields() {
        let agent: Agent = serde_json::from_value(json!({"url": "http://a:1"})).unwrap();
        assert_eq!(agent.url, "http://a:1");
        assert!(agent.name.is_empty());
        let task: Task = serde_json::from_value(json!({"id": "t", "status": "done"})).unwrap();
        assert_eq!(task.status, "done");
    }
}
