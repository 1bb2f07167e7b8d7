use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of lifecycle events carried by the broadcast bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "collection.started")]
    CollectionStarted,
    #[serde(rename = "collection.progress")]
    CollectionProgress,
    #[serde(rename = "collection.completed")]
    CollectionCompleted,
    #[serde(rename = "collection.failed")]
    CollectionFailed,

    #[serde(rename = "processing.started")]
    ProcessingStarted,
    #[serde(rename = "processing.progress")]
    ProcessingProgress,
    #[serde(rename = "processing.completed")]
    ProcessingCompleted,

    #[serde(rename = "briefing.started")]
    BriefingStarted,
    #[serde(rename = "briefing.progress")]
    BriefingProgress,
    #[serde(rename = "briefing.completed")]
    BriefingCompleted,

    #[serde(rename = "system.status")]
    SystemStatus,
    #[serde(rename = "system.health")]
    SystemHealth,

    #[serde(rename = "entity.detected")]
    EntityDetected,
    #[serde(rename = "entity.mention")]
    EntityMention,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::CollectionStarted => "collection.started",
            EventType::CollectionProgress => "collection.progress",
            EventType::CollectionCompleted => "collection.completed",
            EventType::CollectionFailed => "collection.failed",
            EventType::ProcessingStarted => "processing.started",
            EventType::ProcessingProgress => "processing.progress",
            EventType::ProcessingCompleted => "processing.completed",
            EventType::BriefingStarted => "briefing.started",
            EventType::BriefingProgress => "briefing.progress",
            EventType::BriefingCompleted => "briefing.completed",
            EventType::SystemStatus => "system.status",
            EventType::SystemHealth => "system.health",
            EventType::EntityDetected => "entity.detected",
            EventType::EntityMention => "entity.mention",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single broadcast event with payload and provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastEvent {
    #[serde(rename = "event")]
    pub event_type: EventType,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub source: Option<String>,
}

impl BroadcastEvent {
    pub fn new(event_type: EventType, data: serde_json::Value) -> Self {
        Self {
            event_type,
            data,
            timestamp: Utc::now(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_wire_form_is_dotted() {
        let json = serde_json::to_string(&EventType::CollectionCompleted).unwrap();
        assert_eq!(json, "\"collection.completed\"");
        let parsed: EventType = serde_json::from_str("\"entity.mention\"").unwrap();
        assert_eq!(parsed, EventType::EntityMention);
    }

    #[test]
    fn broadcast_event_serializes_timestamp_iso8601() {
        let event = BroadcastEvent::new(
            EventType::SystemStatus,
            serde_json::json!({"ok": true}),
        )
        .with_source("scheduler");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "system.status");
        assert_eq!(value["source"], "scheduler");
        // chrono serde emits RFC 3339 / ISO-8601
        assert!(value["timestamp"].as_str().unwrap().contains('T'));
    }
}
