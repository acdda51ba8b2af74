//! Voxroute Database Layer
//!
//! This crate provides PostgreSQL database access and repository implementations
//! for Voxroute. It includes:
//!
//! - Connection pool management with sqlx
//! - Embedded schema migrations
//! - Repository implementations for users, call tasks, and the audit trail
//! - Compare-and-set call transitions scoped to a single row

pub mod pool;
pub mod repositories;

pub use pool::{create_pool, run_migrations};
pub use repositories::*;

// Re-export commonly used types
pub use sqlx::PgPool;
pub use voxroute_core::{AppError, AppResult};
