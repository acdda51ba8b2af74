//! Call task model and lifecycle state machine
//!
//! A `CallTask` moves through
//!
//! ```text
//!  scheduled --dispatch ok--> in_progress --complete--> completed
//!  scheduled --dispatch failed--> scheduled (route rewritten to budget)
//!  scheduled --worker start--> in_progress
//!  scheduled | in_progress --error--> failed
//!  scheduled --cancel--> cancelled
//! ```
//!
//! `CallTask::plan` is the only place that decides whether a command applies,
//! is an idempotent repeat, or conflicts with the recorded state. It is pure;
//! persisting the planned state atomically is the repository's job.

use crate::error::AppError;
use crate::AppResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Call status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// Created, waiting for dispatch or for the budget worker
    #[default]
    Scheduled,
    /// Connected and being handled by one of the routes
    InProgress,
    /// Finished successfully and billed
    Completed,
    /// Reported as failed by the worker or the premium platform
    Failed,
    /// Cancelled by its owner before it started
    Cancelled,
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallStatus::Scheduled => write!(f, "scheduled"),
            CallStatus::InProgress => write!(f, "in_progress"),
            CallStatus::Completed => write!(f, "completed"),
            CallStatus::Failed => write!(f, "failed"),
            CallStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl CallStatus {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "scheduled" => Some(CallStatus::Scheduled),
            "in_progress" => Some(CallStatus::InProgress),
            "completed" => Some(CallStatus::Completed),
            "failed" => Some(CallStatus::Failed),
            "cancelled" => Some(CallStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal states accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallStatus::Completed | CallStatus::Failed | CallStatus::Cancelled
        )
    }
}

/// Which route carries the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingType {
    /// Premium: the managed conversational-voice platform handles the call
    ElevenlabsAgent,
    /// Budget: carrier + language model + TTS, driven by the external worker
    TwilioCustom,
}

impl fmt::Display for RoutingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingType::ElevenlabsAgent => write!(f, "elevenlabs_agent"),
            RoutingType::TwilioCustom => write!(f, "twilio_custom"),
        }
    }
}

impl RoutingType {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "elevenlabs_agent" => Some(RoutingType::ElevenlabsAgent),
            "twilio_custom" => Some(RoutingType::TwilioCustom),
            _ => None,
        }
    }

    pub fn is_premium(&self) -> bool {
        matches!(self, RoutingType::ElevenlabsAgent)
    }
}

/// Longest call a worker may report, in seconds
pub const MAX_CALL_DURATION_SECONDS: i64 = 86_400;

/// Number of billable minutes for a duration: every started minute counts.
#[inline]
pub fn billable_minutes(duration_seconds: i64) -> i64 {
    if duration_seconds <= 0 {
        return 0;
    }
    duration_seconds / 60 + i64::from(duration_seconds % 60 != 0)
}

/// Price of a call: billable minutes times the per-minute rate
///
/// `None` when the product does not fit in an `i64`.
pub fn call_cost_cents(duration_seconds: i64, rate_cents_per_minute: i64) -> Option<i64> {
    billable_minutes(duration_seconds).checked_mul(rate_cents_per_minute)
}

/// Normalize a phone number: drop common separators, keep an optional
/// leading `+`, and require 7 to 15 digits.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let compact: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect();

    let (plus, digits) = match compact.strip_prefix('+') {
        Some(rest) => ("+", rest),
        None => ("", compact.as_str()),
    };

    if !(7..=15).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    Some(format!("{}{}", plus, digits))
}

/// A request to place a call on the user's behalf
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRequest {
    pub target_phone: String,
    pub target_name: String,
    pub objective: String,
    pub context: Option<String>,
}

impl CallRequest {
    /// Validate and normalize the request fields
    ///
    /// # Errors
    ///
    /// `AppError::Validation` when a required field is blank or the phone
    /// number is not plausible.
    pub fn normalized(&self) -> AppResult<CallRequest> {
        let target_name = self.target_name.trim();
        if target_name.is_empty() {
            return Err(AppError::Validation("target_name is required".to_string()));
        }

        let objective = self.objective.trim();
        if objective.is_empty() {
            return Err(AppError::Validation("objective is required".to_string()));
        }

        if self.target_phone.trim().is_empty() {
            return Err(AppError::Validation("target_phone is required".to_string()));
        }
        let target_phone = normalize_phone(&self.target_phone).ok_or_else(|| {
            AppError::Validation(format!(
                "target_phone is not a valid phone number: {}",
                self.target_phone
            ))
        })?;

        let context = self
            .context
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        Ok(CallRequest {
            target_phone,
            target_name: target_name.to_string(),
            objective: objective.to_string(),
            context,
        })
    }
}

/// Data for inserting a call task
#[derive(Debug, Clone)]
pub struct NewCallTask {
    pub user_id: Uuid,
    pub request: CallRequest,
    pub routing_type: RoutingType,
}

impl NewCallTask {
    /// Materialize the initial `scheduled` record
    pub fn into_task(self, id: Uuid, now: DateTime<Utc>) -> CallTask {
        CallTask {
            id,
            user_id: self.user_id,
            target_phone: self.request.target_phone,
            target_name: self.request.target_name,
            objective: self.request.objective,
            context: self.request.context,
            status: CallStatus::Scheduled,
            routing_type: self.routing_type,
            cost_cents: None,
            duration_seconds: None,
            summary: None,
            failure_reason: None,
            carrier_call_sid: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        }
    }
}

/// Call task entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallTask {
    /// Server-generated call id
    pub id: Uuid,

    /// Requesting user
    pub user_id: Uuid,

    pub target_phone: String,
    pub target_name: String,
    pub objective: String,
    pub context: Option<String>,

    pub status: CallStatus,
    pub routing_type: RoutingType,

    /// Billed cost; present exactly when the call is completed
    pub cost_cents: Option<i64>,

    /// Reported talk time of a completed call
    pub duration_seconds: Option<i64>,

    /// Free-form outcome reported with completion
    pub summary: Option<String>,

    /// Reason recorded when the call failed
    pub failure_reason: Option<String>,

    /// Carrier session id, set once the budget worker dials
    pub carrier_call_sid: Option<String>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Something that wants to move a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallCommand {
    /// The premium platform accepted the outbound call
    DispatchSucceeded,
    /// The premium platform could not be reached or refused the call
    DispatchFailed,
    /// The budget worker dialed the call
    Start { carrier_call_sid: String },
    /// A route reported successful completion; cost is already priced
    Complete {
        duration_seconds: i64,
        cost_cents: i64,
        summary: Option<String>,
    },
    /// A route reported an error
    Fail { reason: String },
    /// The owner cancelled the call
    Cancel,
}

impl CallCommand {
    /// Operation name used in conflicts and logs
    pub fn operation(&self) -> &'static str {
        match self {
            CallCommand::DispatchSucceeded => "mark dispatched",
            CallCommand::DispatchFailed => "fall back",
            CallCommand::Start { .. } => "start",
            CallCommand::Complete { .. } => "complete",
            CallCommand::Fail { .. } => "fail",
            CallCommand::Cancel => "cancel",
        }
    }
}

/// Outcome of planning a command against the current record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Persist this next state (compare-and-set on the current status)
    Apply(CallTask),
    /// The call already reflects the command; nothing to write
    NoOp,
}

impl CallTask {
    /// Decide what `command` does to this call at `now`.
    ///
    /// # Errors
    ///
    /// `AppError::StateConflict` when the command would move the call
    /// backward or re-terminate it with a different outcome.
    pub fn plan(&self, command: &CallCommand, now: DateTime<Utc>) -> AppResult<Transition> {
        use CallStatus::*;

        let mut next = self.clone();
        next.updated_at = now;

        match (command, self.status) {
            (CallCommand::DispatchSucceeded, Scheduled) if self.routing_type.is_premium() => {
                next.status = InProgress;
                next.started_at.get_or_insert(now);
            }
            (CallCommand::DispatchSucceeded, InProgress) if self.routing_type.is_premium() => {
                return Ok(Transition::NoOp);
            }

            (CallCommand::DispatchFailed, Scheduled) => {
                if !self.routing_type.is_premium() {
                    return Ok(Transition::NoOp);
                }
                next.routing_type = RoutingType::TwilioCustom;
            }

            (CallCommand::Start { carrier_call_sid }, Scheduled)
                if !self.routing_type.is_premium() =>
            {
                next.status = InProgress;
                next.started_at.get_or_insert(now);
                next.carrier_call_sid
                    .get_or_insert_with(|| carrier_call_sid.clone());
            }
            (CallCommand::Start { .. }, InProgress) => return Ok(Transition::NoOp),

            (
                CallCommand::Complete {
                    duration_seconds,
                    cost_cents,
                    summary,
                },
                Scheduled | InProgress,
            ) => {
                next.status = Completed;
                next.cost_cents = Some(*cost_cents);
                next.duration_seconds = Some(*duration_seconds);
                next.summary = summary.clone();
                next.completed_at.get_or_insert(now);
            }
            (CallCommand::Complete { .. }, Completed) => return Ok(Transition::NoOp),

            (CallCommand::Fail { reason }, Scheduled | InProgress) => {
                next.status = Failed;
                next.failure_reason = Some(reason.clone());
                next.completed_at.get_or_insert(now);
            }
            (CallCommand::Fail { .. }, Failed) => return Ok(Transition::NoOp),

            (CallCommand::Cancel, Scheduled) => {
                next.status = Cancelled;
                next.completed_at.get_or_insert(now);
            }
            (CallCommand::Cancel, Cancelled) => return Ok(Transition::NoOp),

            _ => return Err(self.conflict(command)),
        }

        Ok(Transition::Apply(next))
    }

    fn conflict(&self, command: &CallCommand) -> AppError {
        let status = match (command, self.routing_type) {
            (CallCommand::Start { .. }, RoutingType::ElevenlabsAgent)
                if self.status == CallStatus::Scheduled =>
            {
                "routed to the premium platform".to_string()
            }
            _ => self.status.to_string(),
        };

        AppError::StateConflict {
            call_id: self.id.to_string(),
            status,
            operation: command.operation().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn task(status: CallStatus, routing_type: RoutingType) -> CallTask {
        let request = CallRequest {
            target_phone: "+15551234567".to_string(),
            target_name: "Dr. Patel's office".to_string(),
            objective: "Reschedule the dentist appointment".to_string(),
            context: None,
        };
        let mut task = NewCallTask {
            user_id: Uuid::new_v4(),
            request,
            routing_type,
        }
        .into_task(Uuid::new_v4(), Utc::now() - Duration::minutes(5));
        task.status = status;
        task
    }

    fn applied(transition: Transition) -> CallTask {
        match transition {
            Transition::Apply(next) => next,
            Transition::NoOp => panic!("expected a state change"),
        }
    }

    fn complete(duration_seconds: i64, cost_cents: i64) -> CallCommand {
        CallCommand::Complete {
            duration_seconds,
            cost_cents,
            summary: Some("Booked for Tuesday".to_string()),
        }
    }

    #[test]
    fn test_billable_minutes_rounds_up() {
        assert_eq!(billable_minutes(0), 0);
        assert_eq!(billable_minutes(1), 1);
        assert_eq!(billable_minutes(60), 1);
        assert_eq!(billable_minutes(61), 2);
        assert_eq!(billable_minutes(185), 4);
        assert_eq!(billable_minutes(i64::MAX), i64::MAX / 60 + 1);
    }

    #[test]
    fn test_call_cost_overflow_is_reported() {
        assert_eq!(call_cost_cents(185, 10), Some(40));
        assert_eq!(call_cost_cents(MAX_CALL_DURATION_SECONDS, 10), Some(14_400));
        assert_eq!(call_cost_cents(i64::MAX, 10), None);
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(
            normalize_phone("+1 (555) 123-4567").as_deref(),
            Some("+15551234567")
        );
        assert_eq!(normalize_phone("555.123.4567").as_deref(), Some("5551234567"));
        assert_eq!(normalize_phone("12345"), None);
        assert_eq!(normalize_phone("+1555abc4567"), None);
        assert_eq!(normalize_phone("++15551234567"), None);
        assert_eq!(normalize_phone("1234567890123456"), None);
    }

    #[test]
    fn test_request_validation() {
        let request = CallRequest {
            target_phone: " +1 555 123 4567 ".to_string(),
            target_name: "  Mom ".to_string(),
            objective: "Wish happy birthday".to_string(),
            context: Some("   ".to_string()),
        };
        let normalized = request.normalized().unwrap();
        assert_eq!(normalized.target_phone, "+15551234567");
        assert_eq!(normalized.target_name, "Mom");
        assert_eq!(normalized.context, None);

        let missing_objective = CallRequest {
            objective: " ".to_string(),
            ..request.clone()
        };
        assert!(matches!(
            missing_objective.normalized(),
            Err(AppError::Validation(_))
        ));

        let bad_phone = CallRequest {
            target_phone: "call me".to_string(),
            ..request
        };
        assert!(matches!(bad_phone.normalized(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_status_parsing_and_terminality() {
        assert_eq!(CallStatus::from_str("in_progress"), Some(CallStatus::InProgress));
        assert_eq!(CallStatus::from_str("done"), None);
        assert!(!CallStatus::Scheduled.is_terminal());
        assert!(!CallStatus::InProgress.is_terminal());
        assert!(CallStatus::Completed.is_terminal());
        assert!(CallStatus::Failed.is_terminal());
        assert!(CallStatus::Cancelled.is_terminal());
        assert_eq!(
            RoutingType::from_str("twilio_custom"),
            Some(RoutingType::TwilioCustom)
        );
    }

    #[test]
    fn test_premium_dispatch_success_starts_call() {
        let call = task(CallStatus::Scheduled, RoutingType::ElevenlabsAgent);
        let now = Utc::now();
        let next = applied(call.plan(&CallCommand::DispatchSucceeded, now).unwrap());
        assert_eq!(next.status, CallStatus::InProgress);
        assert_eq!(next.started_at, Some(now));
        assert_eq!(next.routing_type, RoutingType::ElevenlabsAgent);
    }

    #[test]
    fn test_premium_dispatch_failure_rewrites_route() {
        let call = task(CallStatus::Scheduled, RoutingType::ElevenlabsAgent);
        let next = applied(call.plan(&CallCommand::DispatchFailed, Utc::now()).unwrap());
        assert_eq!(next.status, CallStatus::Scheduled);
        assert_eq!(next.routing_type, RoutingType::TwilioCustom);
        assert_eq!(next.started_at, None);
    }

    #[test]
    fn test_start_sets_sid_and_started_at_once() {
        let call = task(CallStatus::Scheduled, RoutingType::TwilioCustom);
        let first = Utc::now();
        let started = applied(
            call.plan(
                &CallCommand::Start {
                    carrier_call_sid: "CA123".to_string(),
                },
                first,
            )
            .unwrap(),
        );
        assert_eq!(started.status, CallStatus::InProgress);
        assert_eq!(started.carrier_call_sid.as_deref(), Some("CA123"));
        assert_eq!(started.started_at, Some(first));

        let repeat = started
            .plan(
                &CallCommand::Start {
                    carrier_call_sid: "CA123".to_string(),
                },
                first + Duration::seconds(3),
            )
            .unwrap();
        assert_eq!(repeat, Transition::NoOp);
    }

    #[test]
    fn test_start_rejected_for_premium_call() {
        let call = task(CallStatus::Scheduled, RoutingType::ElevenlabsAgent);
        let err = call
            .plan(
                &CallCommand::Start {
                    carrier_call_sid: "CA1".to_string(),
                },
                Utc::now(),
            )
            .unwrap_err();
        assert!(err.is_state_conflict());
    }

    #[test]
    fn test_start_after_terminal_is_conflict() {
        for status in [
            CallStatus::Completed,
            CallStatus::Failed,
            CallStatus::Cancelled,
        ] {
            let call = task(status, RoutingType::TwilioCustom);
            let result = call.plan(
                &CallCommand::Start {
                    carrier_call_sid: "CA9".to_string(),
                },
                Utc::now(),
            );
            assert!(result.unwrap_err().is_state_conflict(), "{status}");
        }
    }

    #[test]
    fn test_complete_prices_and_stamps() {
        let call = task(CallStatus::InProgress, RoutingType::ElevenlabsAgent);
        let now = Utc::now();
        let next = applied(call.plan(&complete(185, 40), now).unwrap());
        assert_eq!(next.status, CallStatus::Completed);
        assert_eq!(next.cost_cents, Some(40));
        assert_eq!(next.duration_seconds, Some(185));
        assert_eq!(next.completed_at, Some(now));
    }

    #[test]
    fn test_complete_twice_is_noop() {
        let call = task(CallStatus::InProgress, RoutingType::TwilioCustom);
        let done = applied(call.plan(&complete(61, 4), Utc::now()).unwrap());
        assert_eq!(done.plan(&complete(61, 4), Utc::now()).unwrap(), Transition::NoOp);
        // a retry with different numbers still never re-bills
        assert_eq!(done.plan(&complete(600, 20), Utc::now()).unwrap(), Transition::NoOp);
    }

    #[test]
    fn test_complete_cannot_resurrect() {
        for status in [CallStatus::Failed, CallStatus::Cancelled] {
            let call = task(status, RoutingType::TwilioCustom);
            let err = call.plan(&complete(60, 2), Utc::now()).unwrap_err();
            assert!(err.is_state_conflict());
        }
    }

    #[test]
    fn test_fail_rules() {
        let call = task(CallStatus::InProgress, RoutingType::ElevenlabsAgent);
        let fail = CallCommand::Fail {
            reason: "callee hung up immediately".to_string(),
        };
        let failed = applied(call.plan(&fail, Utc::now()).unwrap());
        assert_eq!(failed.status, CallStatus::Failed);
        assert_eq!(failed.cost_cents, None);
        assert!(failed.completed_at.is_some());
        assert_eq!(failed.plan(&fail, Utc::now()).unwrap(), Transition::NoOp);

        for status in [CallStatus::Completed, CallStatus::Cancelled] {
            let call = task(status, RoutingType::TwilioCustom);
            assert!(call.plan(&fail, Utc::now()).unwrap_err().is_state_conflict());
        }
    }

    #[test]
    fn test_cancel_only_from_scheduled() {
        let call = task(CallStatus::Scheduled, RoutingType::TwilioCustom);
        let cancelled = applied(call.plan(&CallCommand::Cancel, Utc::now()).unwrap());
        assert_eq!(cancelled.status, CallStatus::Cancelled);
        assert_eq!(
            cancelled.plan(&CallCommand::Cancel, Utc::now()).unwrap(),
            Transition::NoOp
        );

        for status in [
            CallStatus::InProgress,
            CallStatus::Completed,
            CallStatus::Failed,
        ] {
            let call = task(status, RoutingType::TwilioCustom);
            assert!(call
                .plan(&CallCommand::Cancel, Utc::now())
                .unwrap_err()
                .is_state_conflict());
        }
    }

    #[test]
    fn test_terminal_timestamps_never_move() {
        let mut call = task(CallStatus::InProgress, RoutingType::TwilioCustom);
        let started = Utc::now() - Duration::minutes(2);
        call.started_at = Some(started);
        let done = applied(call.plan(&complete(90, 4), Utc::now()).unwrap());
        assert_eq!(done.started_at, Some(started));
    }
}
