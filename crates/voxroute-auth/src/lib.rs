//! Authentication for Voxroute
//!
//! Users authenticate with an HS256 JWT whose subject is their user id.
//! The budget worker authenticates with an optional shared bearer token.
//!
//! # Examples
//!
//! ```no_run
//! use uuid::Uuid;
//! use voxroute_auth::JwtService;
//! use voxroute_core::models::UserRole;
//!
//! let jwt_service = JwtService::new("your-secret-key", 3600);
//! let token = jwt_service.create_token_for_user(Uuid::new_v4(), UserRole::User)?;
//! # Ok::<(), voxroute_core::AppError>(())
//! ```

pub mod claims;
pub mod jwt;
pub mod middleware;

pub use claims::Claims;
pub use jwt::JwtService;
pub use middleware::{AdminUser, AuthenticatedUser, WorkerAuth, WorkerToken};
