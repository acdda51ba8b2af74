//! Voxroute Core Library
//!
//! This crate provides the foundational types, traits, and error handling
//! for the Voxroute call broker. It includes:
//!
//! - Domain models (User, CallTask, CallEvent, usage windows)
//! - The call lifecycle state machine (pure, storage-agnostic)
//! - Repository and dispatcher traits implemented by the outer crates
//! - Unified error handling with HTTP response mapping
//! - Application configuration

pub mod config;
pub mod error;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use error::{AppError, DispatchError};

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
