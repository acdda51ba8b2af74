//! API layer for Voxroute
//!
//! HTTP handlers for scheduling calls, the worker webhooks, usage reporting
//! and user provisioning. Everything is mounted under `/api/v1` by
//! [`configure_routes`].
//!
//! Handlers expect these in app data: `web::Data<CallController>`,
//! `web::Data<dyn UserRepository>`, `web::Data<JwtService>` and
//! `web::Data<WorkerToken>`.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod dto;
pub mod handlers;

use actix_web::{error, web, HttpRequest};
use tracing::debug;
use voxroute_core::AppError;

pub use dto::{ApiResponse, PaginationParams};
pub use handlers::{configure_admin, configure_calls, configure_health, configure_worker};

/// Mount every endpoint under `/api/v1`
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .app_data(json_config())
            .app_data(query_config())
            .app_data(path_config())
            .configure(configure_health)
            .configure(configure_worker)
            .configure(configure_calls)
            .configure(configure_admin),
    );
}

fn bad_request(kind: &str, message: String, req: &HttpRequest) -> actix_web::Error {
    debug!(path = %req.path(), kind, "Rejected malformed request: {}", message);
    AppError::Validation(message).into()
}

/// Malformed JSON bodies answer 400 in the standard error shape
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(64 * 1024)
        .error_handler(|err: error::JsonPayloadError, req| bad_request("body", err.to_string(), req))
}

/// Malformed query strings answer 400 in the standard error shape
pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err: error::QueryPayloadError, req| bad_request("query", err.to_string(), req))
}

/// A call id that is not a UUID answers 400 in the standard error shape
pub fn path_config() -> web::PathConfig {
    web::PathConfig::default()
        .error_handler(|err: error::PathError, req| bad_request("path", err.to_string(), req))
}
