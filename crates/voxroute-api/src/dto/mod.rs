//! Data Transfer Objects (DTOs) for API requests and responses

pub mod call;
pub mod common;
pub mod user;

pub use call::*;
pub use common::*;
pub use user::*;
