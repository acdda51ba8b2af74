//! Call audit trail
//!
//! Append-only events recorded for every state transition and conversation
//! turn. Events are never updated or deleted; they are the source for
//! debugging a call and reconstructing its cost.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use uuid::Uuid;

/// Audit event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallEventType {
    Scheduled,
    DispatchAttempted,
    DispatchSucceeded,
    DispatchFailed,
    Started,
    TurnLogged,
    Completed,
    /// The worker or platform reported an error; the call is now failed
    Error,
    Cancelled,
    /// A transition was rejected; recorded for operator visibility
    StateConflict,
}

impl fmt::Display for CallEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CallEventType::Scheduled => "scheduled",
            CallEventType::DispatchAttempted => "dispatch_attempted",
            CallEventType::DispatchSucceeded => "dispatch_succeeded",
            CallEventType::DispatchFailed => "dispatch_failed",
            CallEventType::Started => "started",
            CallEventType::TurnLogged => "turn_logged",
            CallEventType::Completed => "completed",
            CallEventType::Error => "error",
            CallEventType::Cancelled => "cancelled",
            CallEventType::StateConflict => "state_conflict",
        };
        f.write_str(s)
    }
}

impl CallEventType {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(CallEventType::Scheduled),
            "dispatch_attempted" => Some(CallEventType::DispatchAttempted),
            "dispatch_succeeded" => Some(CallEventType::DispatchSucceeded),
            "dispatch_failed" => Some(CallEventType::DispatchFailed),
            "started" => Some(CallEventType::Started),
            "turn_logged" => Some(CallEventType::TurnLogged),
            "completed" => Some(CallEventType::Completed),
            "error" => Some(CallEventType::Error),
            "cancelled" => Some(CallEventType::Cancelled),
            "state_conflict" => Some(CallEventType::StateConflict),
            _ => None,
        }
    }
}

/// Stored audit event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallEvent {
    /// Monotonic identifier; orders events of the same call
    pub id: i64,

    /// Call this event belongs to
    pub call_id: Uuid,

    pub event_type: CallEventType,

    /// Free-form details (reason, turn text, cost, ...)
    pub payload: JsonValue,

    pub created_at: DateTime<Utc>,
}

/// Data for appending an audit event
#[derive(Debug, Clone, PartialEq)]
pub struct NewCallEvent {
    pub call_id: Uuid,
    pub event_type: CallEventType,
    pub payload: JsonValue,
}

impl NewCallEvent {
    /// Event with an empty payload
    pub fn new(call_id: Uuid, event_type: CallEventType) -> Self {
        Self {
            call_id,
            event_type,
            payload: JsonValue::Object(Default::default()),
        }
    }

    /// Attach a payload
    pub fn payload(mut self, payload: JsonValue) -> Self {
        self.payload = payload;
        self
    }
}
