//! In-memory repositories.
//!
//! The call store holds every row behind one `parking_lot::Mutex`, which makes
//! `compare_and_set` atomic the same way the conditional `UPDATE` is in
//! PostgreSQL.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;
use voxroute_core::models::{
    CallEvent, CallEventType, CallStatus, CallTask, NewCallEvent, NewCallTask, NewUser, UsageWindow,
    User,
};
use voxroute_core::traits::{CallEventRepository, CallRepository, UserRepository};
use voxroute_core::{AppError, AppResult};

/// Users keyed by id.
#[derive(Default)]
pub struct InMemoryUserRepository {
    users: Mutex<HashMap<Uuid, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a user as-is.
    pub fn insert(&self, user: User) {
        self.users.lock().insert(user.id, user);
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.users.lock().get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        Ok(self.users.lock().values().find(|u| u.email == email).cloned())
    }

    async fn create(&self, user: &NewUser) -> AppResult<User> {
        let mut users = self.users.lock();
        if users.values().any(|u| u.email == user.email) {
            return Err(AppError::AlreadyExists(format!(
                "User {} already exists",
                user.email
            )));
        }

        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            is_admin: user.is_admin,
            created_at: now,
            updated_at: now,
        };
        users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn set_admin(&self, id: Uuid, is_admin: bool) -> AppResult<Option<User>> {
        let mut users = self.users.lock();
        Ok(users.get_mut(&id).map(|user| {
            user.is_admin = is_admin;
            user.updated_at = Utc::now();
            user.clone()
        }))
    }
}

/// Call rows keyed by id.
#[derive(Default)]
pub struct InMemoryCallRepository {
    calls: Mutex<HashMap<Uuid, CallTask>>,
}

impl InMemoryCallRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a row directly, bypassing the state machine.
    ///
    /// Lets tests seed calls with chosen timestamps and costs.
    pub fn insert(&self, call: CallTask) {
        self.calls.lock().insert(call.id, call);
    }

    /// Snapshot of every stored row.
    pub fn all(&self) -> Vec<CallTask> {
        self.calls.lock().values().cloned().collect()
    }
}

#[async_trait]
impl CallRepository for InMemoryCallRepository {
    async fn create(&self, call: &NewCallTask) -> AppResult<CallTask> {
        let task = call.clone().into_task(Uuid::now_v7(), Utc::now());
        self.calls.lock().insert(task.id, task.clone());
        Ok(task)
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<CallTask>> {
        Ok(self.calls.lock().get(&id).cloned())
    }

    async fn find_by_carrier_sid(&self, carrier_call_sid: &str) -> AppResult<Option<CallTask>> {
        Ok(self
            .calls
            .lock()
            .values()
            .find(|c| c.carrier_call_sid.as_deref() == Some(carrier_call_sid))
            .cloned())
    }

    async fn list_by_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<CallTask>, i64)> {
        let mut calls: Vec<CallTask> = self
            .calls
            .lock()
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        calls.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = calls.len() as i64;
        let page = calls
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn list_pending(&self) -> AppResult<Vec<CallTask>> {
        let mut calls: Vec<CallTask> = self
            .calls
            .lock()
            .values()
            .filter(|c| c.status == CallStatus::Scheduled && !c.routing_type.is_premium())
            .cloned()
            .collect();
        calls.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(calls)
    }

    async fn compare_and_set(
        &self,
        next: &CallTask,
        expected: &CallTask,
    ) -> AppResult<Option<CallTask>> {
        let mut calls = self.calls.lock();
        let Some(current) = calls.get(&next.id).cloned() else {
            return Ok(None);
        };
        if current.status != expected.status || current.updated_at != expected.updated_at {
            return Ok(None);
        }

        let sid = current
            .carrier_call_sid
            .clone()
            .or_else(|| next.carrier_call_sid.clone());
        if current.carrier_call_sid.is_none() {
            if let Some(sid) = sid.as_deref() {
                if calls_with_sid(&calls, sid, next.id) {
                    return Err(AppError::AlreadyExists(format!(
                        "carrier call sid {} is already bound to another call",
                        sid
                    )));
                }
            }
        }

        let updated = CallTask {
            carrier_call_sid: sid,
            started_at: current.started_at.or(next.started_at),
            completed_at: current.completed_at.or(next.completed_at),
            created_at: current.created_at,
            ..next.clone()
        };
        calls.insert(updated.id, updated.clone());
        Ok(Some(updated))
    }

    async fn count_created_by_user(
        &self,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<i64> {
        let window = UsageWindow { start, end };
        Ok(self
            .calls
            .lock()
            .values()
            .filter(|c| c.user_id == user_id && window.contains(c.created_at))
            .count() as i64)
    }

    async fn sum_completed_cost(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> AppResult<i64> {
        let window = UsageWindow { start, end };
        Ok(self
            .calls
            .lock()
            .values()
            .filter(|c| c.status == CallStatus::Completed)
            .filter(|c| c.completed_at.is_some_and(|at| window.contains(at)))
            .filter_map(|c| c.cost_cents)
            .sum())
    }
}

fn calls_with_sid(calls: &HashMap<Uuid, CallTask>, sid: &str, except: Uuid) -> bool {
    calls
        .values()
        .any(|c| c.id != except && c.carrier_call_sid.as_deref() == Some(sid))
}

/// Append-only event log.
#[derive(Default)]
pub struct InMemoryCallEventRepository {
    events: Mutex<Vec<CallEvent>>,
    next_id: AtomicI64,
    failing: Mutex<Vec<CallEventType>>,
}

impl InMemoryCallEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every append of `event_type` fail with a database error.
    pub fn fail_on(&self, event_type: CallEventType) {
        self.failing.lock().push(event_type);
    }

    /// Event types recorded for a call, in order.
    pub fn types_for(&self, call_id: Uuid) -> Vec<CallEventType> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.call_id == call_id)
            .map(|e| e.event_type)
            .collect()
    }
}

#[async_trait]
impl CallEventRepository for InMemoryCallEventRepository {
    async fn append(&self, event: &NewCallEvent) -> AppResult<CallEvent> {
        if self.failing.lock().contains(&event.event_type) {
            return Err(AppError::Database(format!(
                "insert of {} event failed",
                event.event_type
            )));
        }
        let stored = CallEvent {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            call_id: event.call_id,
            event_type: event.event_type,
            payload: event.payload.clone(),
            created_at: Utc::now(),
        };
        self.events.lock().push(stored.clone());
        Ok(stored)
    }

    async fn list_for_call(&self, call_id: Uuid) -> AppResult<Vec<CallEvent>> {
        Ok(self
            .events
            .lock()
            .iter()
            .filter(|e| e.call_id == call_id)
            .cloned()
            .collect())
    }
}
