//! User provisioning (admin only)

use crate::dto::{
    ApiResponse, CreateUserRequest, ProvisionedUserResponse, SetAdminRequest, UserResponse,
};
use actix_web::{web, HttpResponse};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;
use voxroute_auth::{AdminUser, JwtService};
use voxroute_core::models::NewUser;
use voxroute_core::traits::UserRepository;
use voxroute_core::AppError;

/// Provision a user and mint a bearer token for them
///
/// POST /api/v1/admin/users
#[instrument(skip(users, jwt_service, admin, req), fields(admin_id = %admin.user_id))]
pub async fn create_user(
    users: web::Data<dyn UserRepository>,
    jwt_service: web::Data<JwtService>,
    admin: AdminUser,
    req: web::Json<CreateUserRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("User creation validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let new_user: NewUser = req.into_inner().into();
    let user = users.create(&new_user).await?;
    let access_token = jwt_service.create_token_for_user(user.id, user.role())?;

    info!(user_id = %user.id, is_admin = user.is_admin, "User provisioned");

    let response = ProvisionedUserResponse {
        user: user.into(),
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: jwt_service.expiration_secs(),
    };

    Ok(HttpResponse::Created().json(ApiResponse::with_message(response, "User created")))
}

/// PUT /api/v1/admin/users/{id}/admin
#[instrument(skip(users, admin, req), fields(admin_id = %admin.user_id))]
pub async fn set_admin(
    users: web::Data<dyn UserRepository>,
    admin: AdminUser,
    path: web::Path<Uuid>,
    req: web::Json<SetAdminRequest>,
) -> Result<HttpResponse, AppError> {
    let user_id = path.into_inner();
    let user = users
        .set_admin(user_id, req.is_admin)
        .await?
        .ok_or_else(|| AppError::UserNotFound(user_id.to_string()))?;

    info!(user_id = %user.id, is_admin = user.is_admin, "Admin flag updated");

    Ok(HttpResponse::Ok().json(ApiResponse::success(UserResponse::from(user))))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .route("/users", web::post().to(create_user))
            .route("/users/{id}/admin", web::put().to(set_admin)),
    );
}
