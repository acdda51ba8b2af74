//! Business logic services for Voxroute
//!
//! This crate decides which route carries a call, drives every call through
//! its lifecycle and talks to the premium voice-agent platform.
//!
//! # Services
//!
//! - `decide_route` - Pure routing policy over a ledger snapshot
//! - `UsageLedger` - Weekly cost and per-user call count, derived on read
//! - `ElevenLabsDispatcher` - Single-attempt outbound call to the premium platform
//! - `CallController` - Schedule, webhook transitions, cancel and read accessors

pub mod controller;
pub mod dispatcher;
pub mod ledger;
pub mod routing;

pub use controller::{CallController, Requester, UsageReport};
pub use dispatcher::ElevenLabsDispatcher;
pub use ledger::UsageLedger;
pub use routing::{decide_route, RouteDecision, RouteReason};

/// Business logic constants
pub mod constants {
    /// Times a transition is re-planned after losing a compare-and-set race
    pub const MAX_TRANSITION_ATTEMPTS: usize = 3;

    /// Longest upstream error body kept in a dispatch failure
    pub const MAX_ERROR_BODY_CHARS: usize = 512;

    /// Outbound-call endpoint of the premium platform, relative to its base URL
    pub const OUTBOUND_CALL_PATH: &str = "/v1/convai/twilio/outbound-call";
}
