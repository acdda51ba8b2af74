//! Repository implementations
//!
//! Concrete implementations of the repository traits defined in
//! voxroute-core, using sqlx for PostgreSQL access.

pub mod call_event_repo;
pub mod call_repo;
pub mod user_repo;

pub use call_event_repo::PgCallEventRepository;
pub use call_repo::PgCallRepository;
pub use user_repo::PgUserRepository;
