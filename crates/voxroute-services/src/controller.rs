//! Call lifecycle controller
//!
//! Every state change is planned by `CallTask::plan` against a fresh read and
//! persisted with a compare-and-set on the row it was planned from. A writer
//! that loses the race re-reads and re-plans, so a duplicate webhook that
//! arrives while the first is still in flight ends up as a no-op.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;
use voxroute_core::config::RoutingConfig;
use voxroute_core::models::{
    billable_minutes, call_cost_cents, CallCommand, CallEvent, CallEventType, CallRequest,
    CallStatus, CallTask, NewCallEvent, NewCallTask, RoutingType, Transition, User,
    MAX_CALL_DURATION_SECONDS,
};
use voxroute_core::traits::{
    CallEventRepository, CallRepository, PaginatedResponse, Pagination, PaginationMeta,
    PremiumDispatcher, UserRepository,
};
use voxroute_core::{AppError, AppResult, DispatchError};

use crate::constants::MAX_TRANSITION_ATTEMPTS;
use crate::ledger::UsageLedger;
use crate::routing::{decide_route, RouteDecision};

/// Who is asking, for ownership checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester {
    pub user_id: Uuid,
    pub is_admin: bool,
}

impl Requester {
    fn can_see(&self, call: &CallTask) -> bool {
        self.is_admin || call.user_id == self.user_id
    }
}

/// Current week's ledger and the route a new call would take
#[derive(Debug, Clone, Serialize)]
pub struct UsageReport {
    pub week_start: DateTime<Utc>,
    pub week_end: DateTime<Utc>,
    pub weekly_cost_cents: i64,
    pub weekly_cost_limit_cents: i64,
    pub user_weekly_call_count: i64,
    pub weekly_calls_per_user: i64,
    pub premium_enabled: bool,
    pub is_admin: bool,
    pub selected_route: RoutingType,
    pub reason: String,
}

/// Result of driving one command through the compare-and-set loop
struct Applied {
    call: CallTask,
    changed: bool,
}

pub struct CallController {
    users: Arc<dyn UserRepository>,
    calls: Arc<dyn CallRepository>,
    events: Arc<dyn CallEventRepository>,
    dispatcher: Option<Arc<dyn PremiumDispatcher>>,
    ledger: UsageLedger,
    routing: RoutingConfig,
}

impl CallController {
    /// Controller with the premium route disabled
    pub fn new(
        users: Arc<dyn UserRepository>,
        calls: Arc<dyn CallRepository>,
        events: Arc<dyn CallEventRepository>,
        routing: RoutingConfig,
    ) -> Self {
        Self {
            users,
            ledger: UsageLedger::new(calls.clone()),
            calls,
            events,
            dispatcher: None,
            routing,
        }
    }

    /// Enable the premium route
    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn PremiumDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn premium_enabled(&self) -> bool {
        self.dispatcher.is_some()
    }

    pub fn routing_config(&self) -> &RoutingConfig {
        &self.routing
    }

    // ==================== Scheduling ====================

    /// Validate, route and create a call; premium calls are dispatched inline.
    ///
    /// A premium dispatch failure is never returned: the call falls back to
    /// the budget route and the caller sees a normal pending call.
    #[instrument(skip(self, request))]
    pub async fn schedule(&self, user_id: Uuid, request: &CallRequest) -> AppResult<CallTask> {
        let request = request.normalized()?;
        let user = self.load_user(user_id).await?;

        let snapshot = self.ledger.snapshot(user.id, Utc::now()).await?;
        let decision = decide_route(&user, &snapshot, self.premium_enabled(), &self.routing);

        let call = self
            .calls
            .create(&NewCallTask {
                user_id: user.id,
                request,
                routing_type: decision.route,
            })
            .await?;

        self.record_quietly(
            call.id,
            CallEventType::Scheduled,
            json!({
                "routing_type": decision.route,
                "reason": decision.reason,
                "weekly_cost_cents": snapshot.weekly_cost_cents,
                "user_weekly_call_count": snapshot.user_weekly_call_count,
            }),
        )
        .await;

        info!(
            call_id = %call.id,
            routing_type = %decision.route,
            reason = %decision.reason,
            "Call scheduled"
        );

        if decision.route.is_premium() {
            return self.dispatch_premium(call).await;
        }

        Ok(call)
    }

    /// Once the row exists, only the state transition may fail the request;
    /// audit writes are logged and skipped.
    async fn dispatch_premium(&self, call: CallTask) -> AppResult<CallTask> {
        self.record_quietly(call.id, CallEventType::DispatchAttempted, json!({}))
            .await;

        let outcome = match &self.dispatcher {
            Some(dispatcher) => dispatcher.dispatch(&call).await,
            None => Err(DispatchError::NotConfigured),
        };

        match outcome {
            Ok(receipt) => {
                let applied = match self
                    .apply_after_dispatch(call.id, CallCommand::DispatchSucceeded)
                    .await
                {
                    Ok(Some(applied)) => applied,
                    Ok(None) => return self.load_call(call.id).await,
                    Err(e) => {
                        error!(call_id = %call.id, error = %e, "Premium call placed but not marked in progress");
                        return Ok(call);
                    }
                };
                self.record_quietly(
                    call.id,
                    CallEventType::DispatchSucceeded,
                    serde_json::to_value(&receipt).unwrap_or(JsonValue::Null),
                )
                .await;
                info!(call_id = %call.id, "Premium dispatch accepted");
                Ok(applied.call)
            }
            Err(e) => {
                warn!(call_id = %call.id, error = %e, "Premium dispatch failed, falling back to budget route");
                let Some(applied) = self
                    .apply_after_dispatch(call.id, CallCommand::DispatchFailed)
                    .await?
                else {
                    return self.load_call(call.id).await;
                };
                self.record_quietly(
                    call.id,
                    CallEventType::DispatchFailed,
                    json!({
                        "kind": e.kind(),
                        "reason": e.to_string(),
                        "fallback_routing_type": RoutingType::TwilioCustom,
                    }),
                )
                .await;
                Ok(applied.call)
            }
        }
    }

    /// Apply a dispatch outcome; `None` if the call moved on meanwhile
    async fn apply_after_dispatch(
        &self,
        call_id: Uuid,
        command: CallCommand,
    ) -> AppResult<Option<Applied>> {
        match self.apply(call_id, |_| command.clone()).await {
            Ok(applied) => Ok(Some(applied)),
            Err(e) if e.is_state_conflict() => {
                warn!(call_id = %call_id, error = %e, "Call changed during premium dispatch");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    // ==================== Read accessors ====================

    #[instrument(skip(self))]
    pub async fn get_call(&self, requester: Requester, call_id: Uuid) -> AppResult<CallTask> {
        let call = self.load_call(call_id).await?;
        if !requester.can_see(&call) {
            debug!(call_id = %call_id, "Call belongs to another user");
            return Err(AppError::CallNotFound(call_id.to_string()));
        }
        Ok(call)
    }

    #[instrument(skip(self))]
    pub async fn events(&self, requester: Requester, call_id: Uuid) -> AppResult<Vec<CallEvent>> {
        let call = self.get_call(requester, call_id).await?;
        self.events.list_for_call(call.id).await
    }

    #[instrument(skip(self))]
    pub async fn list_calls(
        &self,
        user_id: Uuid,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<CallTask>> {
        let (calls, total) = self
            .calls
            .list_by_user(user_id, pagination.limit(), pagination.offset())
            .await?;

        Ok(PaginatedResponse {
            data: calls,
            pagination: PaginationMeta::new(total, pagination.page, pagination.per_page),
        })
    }

    /// Budget calls waiting for the worker, oldest first
    #[instrument(skip(self))]
    pub async fn list_pending(&self) -> AppResult<Vec<CallTask>> {
        self.calls.list_pending().await
    }

    /// Resolve a carrier session id to its call
    #[instrument(skip(self))]
    pub async fn lookup_by_sid(&self, carrier_call_sid: &str) -> AppResult<CallTask> {
        let sid = carrier_call_sid.trim();
        if sid.is_empty() {
            return Err(AppError::Validation("carrier_call_sid is required".to_string()));
        }
        self.calls
            .find_by_carrier_sid(sid)
            .await?
            .ok_or_else(|| AppError::CallNotFound(format!("carrier_call_sid {}", sid)))
    }

    #[instrument(skip(self))]
    pub async fn usage(&self, user_id: Uuid) -> AppResult<UsageReport> {
        let user = self.load_user(user_id).await?;
        let snapshot = self.ledger.snapshot(user.id, Utc::now()).await?;
        let RouteDecision { route, reason } =
            decide_route(&user, &snapshot, self.premium_enabled(), &self.routing);

        Ok(UsageReport {
            week_start: snapshot.window.start,
            week_end: snapshot.window.end,
            weekly_cost_cents: snapshot.weekly_cost_cents,
            weekly_cost_limit_cents: self.routing.weekly_cost_limit_cents,
            user_weekly_call_count: snapshot.user_weekly_call_count,
            weekly_calls_per_user: self.routing.weekly_calls_per_user,
            premium_enabled: self.premium_enabled(),
            is_admin: user.is_admin,
            selected_route: route,
            reason: reason.to_string(),
        })
    }

    // ==================== Worker webhooks ====================

    /// The budget worker dialed the call
    #[instrument(skip(self))]
    pub async fn mark_started(&self, call_id: Uuid, carrier_call_sid: &str) -> AppResult<CallTask> {
        let sid = carrier_call_sid.trim();
        if sid.is_empty() {
            return Err(AppError::Validation("carrier_call_sid is required".to_string()));
        }

        let command = CallCommand::Start {
            carrier_call_sid: sid.to_string(),
        };
        let applied = self.transition(call_id, |_| command.clone()).await?;

        if applied.changed {
            self.record(
                call_id,
                CallEventType::Started,
                json!({ "carrier_call_sid": sid }),
            )
            .await?;
            info!(call_id = %call_id, carrier_call_sid = %sid, "Call started");
        } else {
            debug!(call_id = %call_id, "Duplicate start ignored");
        }

        Ok(applied.call)
    }

    /// Append a conversation turn; never changes status
    #[instrument(skip(self, turn))]
    pub async fn log_turn(&self, call_id: Uuid, turn: JsonValue) -> AppResult<CallEvent> {
        let call = self.load_call(call_id).await?;
        if call.status != CallStatus::InProgress {
            debug!(call_id = %call_id, status = %call.status, "Turn logged outside in_progress");
        }
        self.record(call_id, CallEventType::TurnLogged, turn).await
    }

    /// Bill and close a call
    ///
    /// A repeat returns the committed cost unchanged.
    #[instrument(skip(self, summary))]
    pub async fn complete(
        &self,
        call_id: Uuid,
        duration_seconds: i64,
        summary: Option<String>,
    ) -> AppResult<CallTask> {
        if !(0..=MAX_CALL_DURATION_SECONDS).contains(&duration_seconds) {
            return Err(AppError::Validation(format!(
                "duration_seconds must be between 0 and {}",
                MAX_CALL_DURATION_SECONDS
            )));
        }
        let summary = summary.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        let minutes = billable_minutes(duration_seconds);

        // The route can still change before the write lands; price both
        let premium_cost = self.cost_for(duration_seconds, RoutingType::ElevenlabsAgent)?;
        let budget_cost = self.cost_for(duration_seconds, RoutingType::TwilioCustom)?;

        let applied = self
            .transition(call_id, |current| CallCommand::Complete {
                duration_seconds,
                cost_cents: match current.routing_type {
                    RoutingType::ElevenlabsAgent => premium_cost,
                    RoutingType::TwilioCustom => budget_cost,
                },
                summary: summary.clone(),
            })
            .await?;

        if applied.changed {
            let call = &applied.call;
            self.record(
                call_id,
                CallEventType::Completed,
                json!({
                    "duration_seconds": duration_seconds,
                    "billable_minutes": minutes,
                    "cost_cents": call.cost_cents,
                    "routing_type": call.routing_type,
                    "summary": call.summary,
                }),
            )
            .await?;
            info!(
                call_id = %call_id,
                cost_cents = ?call.cost_cents,
                routing_type = %call.routing_type,
                "Call completed"
            );
        } else {
            debug!(call_id = %call_id, "Duplicate completion ignored");
        }

        Ok(applied.call)
    }

    /// Record a failure reported by the worker or the premium platform
    #[instrument(skip(self))]
    pub async fn fail(&self, call_id: Uuid, reason: &str) -> AppResult<CallTask> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AppError::Validation("reason is required".to_string()));
        }

        let command = CallCommand::Fail {
            reason: reason.to_string(),
        };
        let applied = self.transition(call_id, |_| command.clone()).await?;

        if applied.changed {
            self.record(call_id, CallEventType::Error, json!({ "reason": reason }))
                .await?;
            warn!(call_id = %call_id, reason = %reason, "Call failed");
        }

        Ok(applied.call)
    }

    // ==================== Owner actions ====================

    #[instrument(skip(self))]
    pub async fn cancel(&self, requester: Requester, call_id: Uuid) -> AppResult<CallTask> {
        self.get_call(requester, call_id).await?;

        let applied = self.transition(call_id, |_| CallCommand::Cancel).await?;

        if applied.changed {
            self.record(
                call_id,
                CallEventType::Cancelled,
                json!({ "cancelled_by": requester.user_id }),
            )
            .await?;
            info!(call_id = %call_id, "Call cancelled");
        }

        Ok(applied.call)
    }

    // ==================== Internals ====================

    /// `apply`, with rejected transitions recorded in the audit trail
    async fn transition<F>(&self, call_id: Uuid, command: F) -> AppResult<Applied>
    where
        F: Fn(&CallTask) -> CallCommand,
    {
        match self.apply(call_id, command).await {
            Err(e) if e.is_state_conflict() => {
                warn!(call_id = %call_id, error = %e, "Rejected state transition");
                if let Err(audit_err) = self
                    .record(
                        call_id,
                        CallEventType::StateConflict,
                        json!({ "error": e.to_string() }),
                    )
                    .await
                {
                    error!(call_id = %call_id, error = %audit_err, "Failed to record state conflict");
                }
                Err(e)
            }
            other => other,
        }
    }

    /// Plan the command against the stored row and compare-and-set it,
    /// re-planning when another writer got there first.
    async fn apply<F>(&self, call_id: Uuid, command: F) -> AppResult<Applied>
    where
        F: Fn(&CallTask) -> CallCommand,
    {
        for attempt in 1..=MAX_TRANSITION_ATTEMPTS {
            let current = self.load_call(call_id).await?;

            let next = match current.plan(&command(&current), Utc::now())? {
                Transition::NoOp => {
                    return Ok(Applied {
                        call: current,
                        changed: false,
                    })
                }
                Transition::Apply(next) => next,
            };

            if let Some(stored) = self.calls.compare_and_set(&next, &current).await? {
                debug!(call_id = %call_id, from = %current.status, to = %stored.status, "Transition applied");
                return Ok(Applied {
                    call: stored,
                    changed: true,
                });
            }

            debug!(call_id = %call_id, attempt, "Lost compare-and-set race, re-planning");
        }

        error!(call_id = %call_id, "Call kept changing during transition");
        Err(AppError::Internal(format!(
            "Call {} changed concurrently too many times",
            call_id
        )))
    }

    async fn record(
        &self,
        call_id: Uuid,
        event_type: CallEventType,
        payload: JsonValue,
    ) -> AppResult<CallEvent> {
        self.events
            .append(&NewCallEvent::new(call_id, event_type).payload(payload))
            .await
    }

    fn cost_for(&self, duration_seconds: i64, route: RoutingType) -> AppResult<i64> {
        call_cost_cents(duration_seconds, self.routing.rate_for(route)).ok_or_else(|| {
            AppError::Validation(format!(
                "cost of a {} second call does not fit in cents",
                duration_seconds
            ))
        })
    }

    async fn record_quietly(&self, call_id: Uuid, event_type: CallEventType, payload: JsonValue) {
        if let Err(e) = self.record(call_id, event_type, payload).await {
            error!(call_id = %call_id, event_type = %event_type, error = %e, "Failed to append audit event");
        }
    }

    async fn load_call(&self, call_id: Uuid) -> AppResult<CallTask> {
        self.calls
            .find_by_id(call_id)
            .await?
            .ok_or_else(|| AppError::CallNotFound(call_id.to_string()))
    }

    async fn load_user(&self, user_id: Uuid) -> AppResult<User> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::UserNotFound(user_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxroute_test_utils::{
        InMemoryCallEventRepository, InMemoryCallRepository, InMemoryUserRepository,
        ScriptedDispatcher,
    };

    struct Harness {
        controller: Arc<CallController>,
        calls: Arc<InMemoryCallRepository>,
        events: Arc<InMemoryCallEventRepository>,
        dispatcher: Arc<ScriptedDispatcher>,
        user: User,
        admin: User,
    }

    impl Harness {
        fn new(premium: bool) -> Self {
            let users = Arc::new(InMemoryUserRepository::new());
            let calls = Arc::new(InMemoryCallRepository::new());
            let events = Arc::new(InMemoryCallEventRepository::new());
            let dispatcher = Arc::new(ScriptedDispatcher::new());

            let user = User {
                email: "sam@example.test".to_string(),
                ..Default::default()
            };
            let admin = User {
                email: "ops@example.test".to_string(),
                is_admin: true,
                ..Default::default()
            };
            users.insert(user.clone());
            users.insert(admin.clone());

            let mut controller = CallController::new(
                users,
                calls.clone(),
                events.clone(),
                RoutingConfig::default(),
            );
            if premium {
                controller = controller.with_dispatcher(dispatcher.clone());
            }

            Self {
                controller: Arc::new(controller),
                calls,
                events,
                dispatcher,
                user,
                admin,
            }
        }

        fn owner(&self) -> Requester {
            Requester {
                user_id: self.user.id,
                is_admin: false,
            }
        }

        /// Seed `n` completed calls this week for the test user, each costing `cost`
        fn seed_completed(&self, n: usize, cost: i64) {
            let now = Utc::now();
            for _ in 0..n {
                let mut call = NewCallTask {
                    user_id: self.user.id,
                    request: request(),
                    routing_type: RoutingType::TwilioCustom,
                }
                .into_task(Uuid::new_v4(), now);
                call.status = CallStatus::Completed;
                call.cost_cents = Some(cost);
                call.duration_seconds = Some(60);
                call.completed_at = Some(now);
                self.calls.insert(call);
            }
        }
    }

    fn request() -> CallRequest {
        CallRequest {
            target_phone: "+1 (555) 123-4567".to_string(),
            target_name: "Dentist".to_string(),
            objective: "Move Thursday's cleaning to next week".to_string(),
            context: None,
        }
    }

    #[tokio::test]
    async fn test_premium_call_billed_at_premium_rate() {
        let h = Harness::new(true);
        // 3 prior calls, $15 spent: under both limits
        h.seed_completed(3, 500);

        let call = h.controller.schedule(h.user.id, &request()).await.unwrap();
        assert_eq!(call.status, CallStatus::InProgress);
        assert_eq!(call.routing_type, RoutingType::ElevenlabsAgent);
        assert_eq!(call.target_phone, "+15551234567");
        assert!(call.started_at.is_some());

        let done = h.controller.complete(call.id, 185, None).await.unwrap();
        assert_eq!(done.status, CallStatus::Completed);
        assert_eq!(done.cost_cents, Some(40));

        assert_eq!(
            h.events.types_for(call.id),
            vec![
                CallEventType::Scheduled,
                CallEventType::DispatchAttempted,
                CallEventType::DispatchSucceeded,
                CallEventType::Completed,
            ]
        );
    }

    #[tokio::test]
    async fn test_dispatch_failure_falls_back_to_budget() {
        let h = Harness::new(true);
        h.seed_completed(3, 500);
        h.dispatcher.push(Err(DispatchError::HttpStatus {
            status: 500,
            body: "boom".to_string(),
        }));

        let call = h.controller.schedule(h.user.id, &request()).await.unwrap();
        assert_eq!(call.status, CallStatus::Scheduled);
        assert_eq!(call.routing_type, RoutingType::TwilioCustom);
        assert!(h.events.types_for(call.id).contains(&CallEventType::DispatchFailed));

        let pending = h.controller.list_pending().await.unwrap();
        assert_eq!(pending.iter().map(|c| c.id).collect::<Vec<_>>(), vec![call.id]);

        let started = h.controller.mark_started(call.id, "CA100").await.unwrap();
        assert_eq!(started.status, CallStatus::InProgress);
        let first_start = started.started_at;

        let again = h.controller.mark_started(call.id, "CA100").await.unwrap();
        assert_eq!(again.status, CallStatus::InProgress);
        assert_eq!(again.started_at, first_start);
        assert_eq!(
            h.events
                .types_for(call.id)
                .iter()
                .filter(|t| **t == CallEventType::Started)
                .count(),
            1
        );

        let found = h.controller.lookup_by_sid("CA100").await.unwrap();
        assert_eq!(found.id, call.id);
    }

    #[tokio::test]
    async fn test_budget_when_premium_not_configured() {
        let h = Harness::new(false);

        let call = h.controller.schedule(h.admin.id, &request()).await.unwrap();
        assert_eq!(call.routing_type, RoutingType::TwilioCustom);
        assert_eq!(call.status, CallStatus::Scheduled);
        assert!(h.dispatcher.dispatched().is_empty());
    }

    #[tokio::test]
    async fn test_user_call_limit_routes_to_budget() {
        let h = Harness::new(true);
        h.seed_completed(4, 10);

        let call = h.controller.schedule(h.user.id, &request()).await.unwrap();
        assert_eq!(call.routing_type, RoutingType::TwilioCustom);
        assert!(h.dispatcher.dispatched().is_empty());

        let usage = h.controller.usage(h.user.id).await.unwrap();
        assert_eq!(usage.user_weekly_call_count, 5);
        assert_eq!(usage.reason, "user_call_limit_reached");
    }

    #[tokio::test]
    async fn test_admin_bypasses_cost_limit() {
        let h = Harness::new(true);
        h.seed_completed(1, 2500);

        let call = h.controller.schedule(h.admin.id, &request()).await.unwrap();
        assert_eq!(call.routing_type, RoutingType::ElevenlabsAgent);

        let usage = h.controller.usage(h.user.id).await.unwrap();
        assert_eq!(usage.selected_route, RoutingType::TwilioCustom);
        assert_eq!(usage.reason, "weekly_cost_limit_reached");
    }

    #[tokio::test]
    async fn test_billing_rounds_up_per_started_minute() {
        let h = Harness::new(false);

        let a = h.controller.schedule(h.user.id, &request()).await.unwrap();
        let b = h.controller.schedule(h.user.id, &request()).await.unwrap();

        assert_eq!(h.controller.complete(a.id, 60, None).await.unwrap().cost_cents, Some(2));
        assert_eq!(h.controller.complete(b.id, 61, None).await.unwrap().cost_cents, Some(4));
    }

    #[tokio::test]
    async fn test_duplicate_complete_does_not_rebill() {
        let h = Harness::new(false);
        let call = h.controller.schedule(h.user.id, &request()).await.unwrap();
        h.controller.mark_started(call.id, "CA7").await.unwrap();

        let first = h.controller.complete(call.id, 120, Some("done".into())).await.unwrap();
        let second = h.controller.complete(call.id, 900, None).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.cost_cents, Some(4));
    }

    #[tokio::test]
    async fn test_concurrent_completes_bill_once() {
        let h = Harness::new(false);
        let call = h.controller.schedule(h.user.id, &request()).await.unwrap();
        h.controller.mark_started(call.id, "CA8").await.unwrap();

        let c1 = h.controller.clone();
        let c2 = h.controller.clone();
        let (r1, r2) = tokio::join!(
            tokio::spawn(async move { c1.complete(call.id, 61, None).await }),
            tokio::spawn(async move { c2.complete(call.id, 61, None).await }),
        );

        let (r1, r2) = (r1.unwrap().unwrap(), r2.unwrap().unwrap());
        assert_eq!(r1.cost_cents, Some(4));
        assert_eq!(r2.cost_cents, Some(4));
        assert_eq!(
            h.events
                .types_for(call.id)
                .iter()
                .filter(|t| **t == CallEventType::Completed)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_terminal_calls_reject_backward_transitions() {
        let h = Harness::new(false);
        let call = h.controller.schedule(h.user.id, &request()).await.unwrap();
        h.controller.fail(call.id, "busy signal").await.unwrap();

        // idempotent repeat
        let again = h.controller.fail(call.id, "busy signal").await.unwrap();
        assert_eq!(again.status, CallStatus::Failed);

        let err = h.controller.complete(call.id, 30, None).await.unwrap_err();
        assert!(err.is_state_conflict());
        let err = h.controller.mark_started(call.id, "CA9").await.unwrap_err();
        assert!(err.is_state_conflict());

        let stored = h.calls.find_by_id(call.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CallStatus::Failed);
        assert_eq!(stored.cost_cents, None);
        assert!(h.events.types_for(call.id).contains(&CallEventType::StateConflict));
    }

    #[tokio::test]
    async fn test_completed_call_cannot_fail() {
        let h = Harness::new(false);
        let call = h.controller.schedule(h.user.id, &request()).await.unwrap();
        h.controller.complete(call.id, 10, None).await.unwrap();

        let err = h.controller.fail(call.id, "late error").await.unwrap_err();
        assert!(err.is_state_conflict());
    }

    #[tokio::test]
    async fn test_cancel_rules() {
        let h = Harness::new(false);
        let call = h.controller.schedule(h.user.id, &request()).await.unwrap();

        let stranger = Requester {
            user_id: Uuid::new_v4(),
            is_admin: false,
        };
        assert!(matches!(
            h.controller.cancel(stranger, call.id).await,
            Err(AppError::CallNotFound(_))
        ));

        let cancelled = h.controller.cancel(h.owner(), call.id).await.unwrap();
        assert_eq!(cancelled.status, CallStatus::Cancelled);
        assert!(h.controller.list_pending().await.unwrap().is_empty());

        // repeat is a no-op
        h.controller.cancel(h.owner(), call.id).await.unwrap();

        let other = h.controller.schedule(h.user.id, &request()).await.unwrap();
        h.controller.mark_started(other.id, "CA10").await.unwrap();
        let err = h.controller.cancel(h.owner(), other.id).await.unwrap_err();
        assert!(err.is_state_conflict());
    }

    #[tokio::test]
    async fn test_turns_are_logged_after_completion() {
        let h = Harness::new(false);
        let call = h.controller.schedule(h.user.id, &request()).await.unwrap();
        h.controller.complete(call.id, 42, None).await.unwrap();

        let event = h
            .controller
            .log_turn(call.id, json!({"speaker": "agent", "text": "Goodbye"}))
            .await
            .unwrap();
        assert_eq!(event.event_type, CallEventType::TurnLogged);

        let stored = h.calls.find_by_id(call.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CallStatus::Completed);
    }

    #[tokio::test]
    async fn test_unknown_call_is_not_found() {
        let h = Harness::new(false);
        let missing = Uuid::new_v4();

        assert!(matches!(
            h.controller.mark_started(missing, "CA1").await,
            Err(AppError::CallNotFound(_))
        ));
        assert!(matches!(
            h.controller.log_turn(missing, json!({})).await,
            Err(AppError::CallNotFound(_))
        ));
        assert!(matches!(
            h.controller.lookup_by_sid("CA-unknown").await,
            Err(AppError::CallNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_validation() {
        let h = Harness::new(false);

        let mut bad = request();
        bad.target_phone = "12".to_string();
        assert!(matches!(
            h.controller.schedule(h.user.id, &bad).await,
            Err(AppError::Validation(_))
        ));

        let call = h.controller.schedule(h.user.id, &request()).await.unwrap();
        assert!(matches!(
            h.controller.complete(call.id, -1, None).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            h.controller.fail(call.id, "  ").await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_oversized_duration_is_rejected_without_billing() {
        let h = Harness::new(false);
        let call = h.controller.schedule(h.user.id, &request()).await.unwrap();

        for duration in [MAX_CALL_DURATION_SECONDS + 1, i64::MAX] {
            assert!(matches!(
                h.controller.complete(call.id, duration, None).await,
                Err(AppError::Validation(_))
            ));
        }

        let stored = h.controller.get_call(h.owner(), call.id).await.unwrap();
        assert_eq!(stored.status, CallStatus::Scheduled);
        assert_eq!(stored.cost_cents, None);

        let done = h
            .controller
            .complete(call.id, MAX_CALL_DURATION_SECONDS, None)
            .await
            .unwrap();
        assert_eq!(done.cost_cents, Some(1440 * 2));
    }

    #[tokio::test]
    async fn test_cost_overflow_is_a_validation_error() {
        let users = Arc::new(InMemoryUserRepository::new());
        let calls = Arc::new(InMemoryCallRepository::new());
        let user = User::default();
        users.insert(user.clone());

        let controller = CallController::new(
            users,
            calls,
            Arc::new(InMemoryCallEventRepository::new()),
            RoutingConfig {
                budget_rate_cents_per_minute: i64::MAX,
                ..RoutingConfig::default()
            },
        );

        let call = controller.schedule(user.id, &request()).await.unwrap();
        assert!(matches!(
            controller.complete(call.id, 61, None).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_audit_failure_before_dispatch_does_not_strand_premium_call() {
        let h = Harness::new(true);
        h.events.fail_on(CallEventType::Scheduled);
        h.events.fail_on(CallEventType::DispatchAttempted);

        let call = h.controller.schedule(h.user.id, &request()).await.unwrap();
        assert_eq!(call.status, CallStatus::InProgress);
        assert_eq!(call.routing_type, RoutingType::ElevenlabsAgent);
        assert_eq!(h.dispatcher.dispatched(), vec![call.id]);
        assert_eq!(
            h.events.types_for(call.id),
            vec![CallEventType::DispatchSucceeded]
        );
    }

    #[tokio::test]
    async fn test_audit_failure_after_dispatch_still_reports_the_placed_call() {
        let h = Harness::new(true);
        h.events.fail_on(CallEventType::DispatchSucceeded);

        let call = h.controller.schedule(h.user.id, &request()).await.unwrap();
        assert_eq!(call.status, CallStatus::InProgress);
        assert_eq!(h.dispatcher.dispatched().len(), 1);
    }

    #[tokio::test]
    async fn test_audit_failure_on_fallback_still_queues_for_worker() {
        let h = Harness::new(true);
        h.dispatcher.push(Err(DispatchError::Timeout(15)));
        h.events.fail_on(CallEventType::DispatchAttempted);
        h.events.fail_on(CallEventType::DispatchFailed);

        let call = h.controller.schedule(h.user.id, &request()).await.unwrap();
        assert_eq!(call.routing_type, RoutingType::TwilioCustom);

        let pending = h.controller.list_pending().await.unwrap();
        assert_eq!(pending.iter().map(|c| c.id).collect::<Vec<_>>(), vec![call.id]);
    }

    #[tokio::test]
    async fn test_admin_sees_other_users_calls() {
        let h = Harness::new(false);
        let call = h.controller.schedule(h.user.id, &request()).await.unwrap();

        let admin = Requester {
            user_id: h.admin.id,
            is_admin: true,
        };
        assert_eq!(h.controller.get_call(admin, call.id).await.unwrap().id, call.id);
        assert_eq!(h.controller.events(admin, call.id).await.unwrap().len(), 1);
    }
}
