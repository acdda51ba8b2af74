//! Call handlers
//!
//! Endpoints used by end users: scheduling, reading their calls and the
//! weekly usage report, and cancelling a call that has not started.

use crate::dto::{ApiResponse, PaginationParams, ScheduleCallRequest};
use actix_web::{web, HttpResponse};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;
use voxroute_auth::AuthenticatedUser;
use voxroute_core::models::CallRequest;
use voxroute_core::traits::Pagination;
use voxroute_core::AppError;
use voxroute_services::{CallController, Requester};

fn requester(user: &AuthenticatedUser) -> Requester {
    Requester {
        user_id: user.user_id,
        is_admin: user.is_admin(),
    }
}

/// Schedule a call; the response tells which route it took
///
/// POST /api/v1/schedule-call
#[instrument(skip(controller, user, req), fields(user_id = %user.user_id))]
pub async fn schedule_call(
    controller: web::Data<CallController>,
    user: AuthenticatedUser,
    req: web::Json<ScheduleCallRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Schedule validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let request: CallRequest = req.into_inner().into();
    let call = controller.schedule(user.user_id, &request).await?;

    info!(
        call_id = %call.id,
        routing_type = %call.routing_type,
        status = %call.status,
        "Call scheduled"
    );

    Ok(HttpResponse::Created().json(ApiResponse::success(call)))
}

/// GET /api/v1/call/{id}
#[instrument(skip(controller, user))]
pub async fn get_call(
    controller: web::Data<CallController>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let call = controller.get_call(requester(&user), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(call)))
}

/// Audit trail of a call, oldest first
///
/// GET /api/v1/call/{id}/events
#[instrument(skip(controller, user))]
pub async fn get_call_events(
    controller: web::Data<CallController>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let events = controller.events(requester(&user), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(events)))
}

/// The caller's calls, newest first
///
/// GET /api/v1/calls
#[instrument(skip(controller, user, query))]
pub async fn list_calls(
    controller: web::Data<CallController>,
    user: AuthenticatedUser,
    query: web::Query<PaginationParams>,
) -> Result<HttpResponse, AppError> {
    query.validate().map_err(|e| {
        warn!("Pagination validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    debug!(
        page = query.page,
        per_page = query.per_page,
        "Listing calls"
    );

    let page = controller
        .list_calls(user.user_id, Pagination::from(&*query))
        .await?;

    Ok(HttpResponse::Ok().json(page))
}

/// POST /api/v1/call/{id}/cancel
#[instrument(skip(controller, user))]
pub async fn cancel_call(
    controller: web::Data<CallController>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let call = controller.cancel(requester(&user), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(call)))
}

/// This week's usage and the route a new call would take
///
/// GET /api/v1/usage
#[instrument(skip(controller, user), fields(user_id = %user.user_id))]
pub async fn get_usage(
    controller: web::Data<CallController>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let report = controller.usage(user.user_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(report)))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/schedule-call", web::post().to(schedule_call))
        .route("/calls", web::get().to(list_calls))
        .route("/usage", web::get().to(get_usage))
        .route("/call/{id}", web::get().to(get_call))
        .route("/call/{id}/events", web::get().to(get_call_events))
        .route("/call/{id}/cancel", web::post().to(cancel_call));
}
