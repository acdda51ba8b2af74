//! Test utilities for Voxroute.
//!
//! In-memory implementations of the repository traits and a scripted premium
//! dispatcher, so the controller and the HTTP layer can be exercised without
//! PostgreSQL or the premium platform.

pub mod dispatcher;
pub mod repositories;

pub use dispatcher::ScriptedDispatcher;
pub use repositories::{InMemoryCallEventRepository, InMemoryCallRepository, InMemoryUserRepository};
