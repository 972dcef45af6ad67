//! Event stream types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::experiments::Variant;

/// Type of a behavioral event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SessionStart,
    ProfileView,
    Match,
    MessageSent,
    VerificationStarted,
    VerificationCompleted,
}

/// One row of the append-only event log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// User who produced the event
    pub user_id: Uuid,
    /// Event type
    pub event_type: EventType,
    /// Event timestamp
    pub timestamp: DateTime<Utc>,
    /// Session the event belongs to
    pub session_id: Uuid,
    /// Free-form property bag
    #[serde(default)]
    pub properties: Map<String, Value>,
    /// Variant of the producing user
    pub variant: Variant,
}

impl EventRecord {
    /// Read a numeric property if present
    pub fn property_f64(&self, key: &str) -> Option<f64> {
        self.properties.get(key).and_then(Value::as_f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_access() {
        let mut properties = Map::new();
        properties.insert("duration_seconds".to_string(), Value::from(312));

        let event = EventRecord {
            user_id: Uuid::nil(),
            event_type: EventType::SessionStart,
            timestamp: Utc::now(),
            session_id: Uuid::nil(),
            properties,
            variant: Variant::Control,
        };

        assert_eq!(event.property_f64("duration_seconds"), Some(312.0));
        assert_eq!(event.property_f64("missing"), None);
    }
}
