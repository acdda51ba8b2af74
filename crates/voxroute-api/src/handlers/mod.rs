//! HTTP request handlers

pub mod admin;
pub mod calls;
pub mod health;
pub mod worker;

pub use admin::configure as configure_admin;
pub use calls::configure as configure_calls;
pub use health::configure as configure_health;
pub use worker::configure as configure_worker;
