//! Worker webhooks
//!
//! Called by the budget worker and carrier callbacks, never by end users.
//! Deliveries may repeat or arrive out of order: a report of a state the call
//! already reached answers 200 with the current call, a report that would move
//! the call backward answers 409.

use crate::dto::{
    ApiResponse, CompleteCallRequest, ErrorReportRequest, LookupQuery, LookupResponse,
    StartCallRequest, TurnRequest,
};
use actix_web::{web, HttpResponse};
use tracing::{debug, instrument, warn};
use uuid::Uuid;
use validator::Validate;
use voxroute_auth::WorkerAuth;
use voxroute_core::AppError;
use voxroute_services::CallController;

/// Budget calls waiting to be dialed, oldest first
///
/// GET /api/v1/pending-calls
#[instrument(skip(controller, _worker))]
pub async fn pending_calls(
    controller: web::Data<CallController>,
    _worker: WorkerAuth,
) -> Result<HttpResponse, AppError> {
    let calls = controller.list_pending().await?;
    debug!(count = calls.len(), "Pending calls listed");
    Ok(HttpResponse::Ok().json(ApiResponse::success(calls)))
}

/// POST /api/v1/call/{id}/start
#[instrument(skip(controller, _worker, req))]
pub async fn start_call(
    controller: web::Data<CallController>,
    _worker: WorkerAuth,
    path: web::Path<Uuid>,
    req: web::Json<StartCallRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Start validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let call = controller
        .mark_started(path.into_inner(), &req.carrier_call_sid)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(call)))
}

/// POST /api/v1/call/{id}/turn
#[instrument(skip(controller, _worker, req))]
pub async fn log_turn(
    controller: web::Data<CallController>,
    _worker: WorkerAuth,
    path: web::Path<Uuid>,
    req: web::Json<TurnRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Turn validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let event = controller
        .log_turn(path.into_inner(), req.into_inner().into_payload())
        .await?;
    Ok(HttpResponse::Created().json(ApiResponse::success(event)))
}

/// POST /api/v1/call/{id}/complete
#[instrument(skip(controller, _worker, req))]
pub async fn complete_call(
    controller: web::Data<CallController>,
    _worker: WorkerAuth,
    path: web::Path<Uuid>,
    req: web::Json<CompleteCallRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Completion validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let req = req.into_inner();
    let call = controller
        .complete(path.into_inner(), req.duration_seconds, req.summary)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(call)))
}

/// POST /api/v1/call/{id}/error
#[instrument(skip(controller, _worker, req))]
pub async fn report_error(
    controller: web::Data<CallController>,
    _worker: WorkerAuth,
    path: web::Path<Uuid>,
    req: web::Json<ErrorReportRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Error report validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let call = controller.fail(path.into_inner(), &req.reason).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(call)))
}

/// Resolve a carrier session id to our call id
///
/// POST /api/v1/call/lookup?carrier_call_sid=...
#[instrument(skip(controller, _worker, query))]
pub async fn lookup_call(
    controller: web::Data<CallController>,
    _worker: WorkerAuth,
    query: web::Query<LookupQuery>,
) -> Result<HttpResponse, AppError> {
    query.validate().map_err(|e| {
        warn!("Lookup validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let call = controller
        .lookup_by_sid(query.carrier_call_sid.trim())
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(LookupResponse::from(&call))))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/pending-calls", web::get().to(pending_calls))
        .route("/call/lookup", web::post().to(lookup_call))
        .route("/call/{id}/start", web::post().to(start_call))
        .route("/call/{id}/turn", web::post().to(log_turn))
        .route("/call/{id}/complete", web::post().to(complete_call))
        .route("/call/{id}/error", web::post().to(report_error));
}
