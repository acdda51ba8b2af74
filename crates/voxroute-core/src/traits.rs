//! Common traits for repositories and the premium dispatcher
//!
//! The database crate implements the repositories against PostgreSQL; the
//! services crate implements the dispatcher against the premium platform.

use crate::error::{AppError, DispatchError};
use crate::models::{CallEvent, CallTask, NewCallEvent, NewCallTask, NewUser, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// User repository
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find user by id
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    /// Find user by email
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    /// Provision a user
    async fn create(&self, user: &NewUser) -> Result<User, AppError>;

    /// Change the admin flag; `None` when the user does not exist
    async fn set_admin(&self, id: Uuid, is_admin: bool) -> Result<Option<User>, AppError>;
}

/// Call task repository
///
/// The call row is the only mutable shared resource. Every status change goes
/// through `compare_and_set`, which must be atomic for a single row.
#[async_trait]
pub trait CallRepository: Send + Sync {
    /// Insert a new `scheduled` call
    async fn create(&self, call: &NewCallTask) -> Result<CallTask, AppError>;

    /// Find call by id
    async fn find_by_id(&self, id: Uuid) -> Result<Option<CallTask>, AppError>;

    /// Find call by the carrier's session id
    async fn find_by_carrier_sid(&self, carrier_call_sid: &str)
        -> Result<Option<CallTask>, AppError>;

    /// A user's calls, newest first, with the total count
    async fn list_by_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<CallTask>, i64), AppError>;

    /// Budget-routed calls still waiting for the worker, oldest first
    async fn list_pending(&self) -> Result<Vec<CallTask>, AppError>;

    /// Persist `next` only if the stored row still has the `status` and
    /// `updated_at` of `current`, the row `next` was planned from.
    ///
    /// Returns the stored row on success, `None` if another writer moved the
    /// call first. `started_at`, `completed_at` and `carrier_call_sid` are
    /// never overwritten once set.
    async fn compare_and_set(
        &self,
        next: &CallTask,
        current: &CallTask,
    ) -> Result<Option<CallTask>, AppError>;

    /// Calls created by `user_id` in `[start, end)`
    async fn count_created_by_user(
        &self,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64, AppError>;

    /// Sum of `cost_cents` of calls completed in `[start, end)`, all users
    async fn sum_completed_cost(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64, AppError>;
}

/// Append-only audit trail
#[async_trait]
pub trait CallEventRepository: Send + Sync {
    /// Append an event
    async fn append(&self, event: &NewCallEvent) -> Result<CallEvent, AppError>;

    /// All events for a call in creation order
    async fn list_for_call(&self, call_id: Uuid) -> Result<Vec<CallEvent>, AppError>;
}

/// What the premium platform returned for an accepted call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReceipt {
    /// HTTP status of the accepted request
    pub status: u16,

    /// Platform conversation id, when reported
    pub conversation_id: Option<String>,

    /// Carrier session id the platform used, when reported
    pub carrier_call_sid: Option<String>,
}

/// Places a call on the managed voice-agent platform
///
/// A single attempt per call; retrying a phone call is a business decision
/// that belongs to the caller of the controller, not to this layer.
#[async_trait]
pub trait PremiumDispatcher: Send + Sync {
    async fn dispatch(&self, call: &CallTask) -> Result<DispatchReceipt, DispatchError>;
}

/// Pagination parameters
#[derive(Debug, Clone, Default)]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
}

impl Pagination {
    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 100),
        }
    }

    /// Saturates instead of overflowing; a page past the end is just empty
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.per_page)
    }

    pub fn limit(&self) -> i64 {
        self.per_page
    }
}

/// Paginated response wrapper
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize)]
pub struct PaginationMeta {
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl PaginationMeta {
    pub fn new(total: i64, page: i64, per_page: i64) -> Self {
        let total_pages = if per_page > 0 {
            (total + per_page - 1) / per_page
        } else {
            0
        };

        Self {
            total,
            page,
            per_page,
            total_pages,
        }
    }
}
