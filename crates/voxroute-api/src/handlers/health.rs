//! Liveness and token check endpoints

use actix_web::{web, HttpResponse};
use serde_json::json;
use voxroute_auth::AuthenticatedUser;

/// GET /api/v1/health
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": "voxroute",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Confirms a bearer token is accepted
///
/// GET /api/v1/health/auth
pub async fn health_auth(user: AuthenticatedUser) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "ok": true,
        "message": "Auth OK",
        "user_id": user.user_id,
    }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/health/auth", web::get().to(health_auth));
}
