//! Call DTOs
//!
//! Request bodies for the user-facing call endpoints and the worker webhooks.
//! Field-level checks happen here; phone plausibility and trimming are left to
//! `CallRequest::normalized` so every entry point shares them.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;
use validator::Validate;
use voxroute_core::models::{CallRequest, CallStatus, CallTask, RoutingType};

/// Request to place a call
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ScheduleCallRequest {
    #[validate(length(min = 1, max = 32, message = "target_phone is required"))]
    pub target_phone: String,

    #[validate(length(min = 1, max = 200, message = "target_name is required"))]
    pub target_name: String,

    #[validate(length(min = 1, max = 2000, message = "objective is required"))]
    pub objective: String,

    #[validate(length(max = 4000, message = "context is too long"))]
    pub context: Option<String>,
}

impl From<ScheduleCallRequest> for CallRequest {
    fn from(req: ScheduleCallRequest) -> Self {
        Self {
            target_phone: req.target_phone,
            target_name: req.target_name,
            objective: req.objective,
            context: req.context,
        }
    }
}

/// Worker report: the budget call was dialed
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct StartCallRequest {
    #[validate(length(min = 1, max = 128, message = "carrier_call_sid is required"))]
    pub carrier_call_sid: String,
}

/// One conversation turn
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TurnRequest {
    /// Who spoke, e.g. `agent` or `callee`
    #[validate(length(min = 1, max = 32, message = "speaker is required"))]
    pub speaker: String,

    #[serde(default)]
    pub text: String,

    /// Anything else the worker wants kept with the turn
    #[serde(default)]
    pub metadata: Option<JsonValue>,
}

impl TurnRequest {
    /// Audit payload for this turn
    pub fn into_payload(self) -> JsonValue {
        let mut payload = json!({
            "speaker": self.speaker,
            "text": self.text,
        });
        if let Some(metadata) = self.metadata {
            payload["metadata"] = metadata;
        }
        payload
    }
}

/// Worker report: the call ended normally
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CompleteCallRequest {
    #[validate(range(
        min = 0,
        max = 86400,
        message = "duration_seconds must be between 0 and 86400"
    ))]
    pub duration_seconds: i64,

    #[validate(length(max = 4000, message = "summary is too long"))]
    pub summary: Option<String>,
}

/// Worker report: the call failed
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ErrorReportRequest {
    #[validate(length(min = 1, max = 1000, message = "reason is required"))]
    pub reason: String,
}

/// `?carrier_call_sid=` for the lookup endpoint
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LookupQuery {
    #[validate(length(min = 1, message = "carrier_call_sid is required"))]
    pub carrier_call_sid: String,
}

/// Call id resolved from a carrier session id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupResponse {
    pub call_id: Uuid,
    pub status: CallStatus,
    pub routing_type: RoutingType,
}

impl From<&CallTask> for LookupResponse {
    fn from(call: &CallTask) -> Self {
        Self {
            call_id: call.id,
            status: call.status,
            routing_type: call.routing_type,
        }
    }
}
