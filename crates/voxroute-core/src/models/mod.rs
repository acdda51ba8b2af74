//! Domain models for Voxroute
//!
//! This module contains the core domain models: users, call tasks with their
//! lifecycle state machine, the per-call audit trail, and weekly usage windows.

pub mod call;
pub mod event;
pub mod usage;
pub mod user;

pub use call::{
    billable_minutes, call_cost_cents, CallCommand, CallRequest, CallStatus, CallTask,
    NewCallTask, RoutingType, Transition, MAX_CALL_DURATION_SECONDS,
};
pub use event::{CallEvent, CallEventType, NewCallEvent};
pub use usage::{LedgerSnapshot, UsageWindow};
pub use user::{NewUser, User, UserRole};
