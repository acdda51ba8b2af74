//! Actix-web request extractors for bearer authentication
//!
//! `AuthenticatedUser` and `AdminUser` validate a user JWT. `WorkerAuth`
//! checks the optional shared token that guards the worker endpoints.

use crate::jwt::JwtService;
use crate::Claims;
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use futures::future::{ready, Ready};
use tracing::{debug, warn};
use uuid::Uuid;
use voxroute_core::error::AppError;
use voxroute_core::models::UserRole;

/// Shared secret for the budget worker; `None` leaves worker endpoints open
#[derive(Clone, Default)]
pub struct WorkerToken(pub Option<String>);

impl WorkerToken {
    pub fn new(token: Option<String>) -> Self {
        Self(token.filter(|t| !t.trim().is_empty()))
    }

    pub fn is_configured(&self) -> bool {
        self.0.is_some()
    }
}

impl std::fmt::Debug for WorkerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shown = if self.0.is_some() { "[REDACTED]" } else { "none" };
        f.debug_tuple("WorkerToken").field(&shown).finish()
    }
}

/// Extract the bearer credential from the Authorization header
fn extract_bearer(req: &HttpRequest) -> Option<String> {
    let header = req.headers().get("Authorization")?.to_str().ok()?;
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Authenticated user extractor
///
/// # Examples
///
/// ```no_run
/// use actix_web::HttpResponse;
/// use voxroute_auth::middleware::AuthenticatedUser;
///
/// async fn protected_handler(user: AuthenticatedUser) -> HttpResponse {
///     HttpResponse::Ok().json(serde_json::json!({ "user_id": user.user_id }))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub role: UserRole,

    /// Full claims from the JWT token
    pub claims: Claims,
}

impl AuthenticatedUser {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    fn authenticate(req: &HttpRequest) -> Result<Self, AppError> {
        let jwt_service = req.app_data::<web::Data<JwtService>>().ok_or_else(|| {
            warn!("JwtService not found in app data");
            AppError::Internal("Authentication service not configured".to_string())
        })?;

        let token = extract_bearer(req).ok_or_else(|| {
            debug!("No bearer token found in request");
            AppError::MissingBearer
        })?;

        let claims = jwt_service.validate_token(&token)?;
        let user_id = claims
            .user_id()
            .ok_or_else(|| AppError::InvalidToken("Subject is not a user id".to_string()))?;

        debug!(user_id = %user_id, role = %claims.role, "User authenticated");

        Ok(AuthenticatedUser {
            user_id,
            role: claims.role,
            claims,
        })
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Self::authenticate(req).map_err(|e| {
            warn!(error = %e, "Authentication failed");
            e.into()
        }))
    }
}

/// Admin user extractor; `Forbidden` when the token role is not admin
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthenticatedUser);

impl std::ops::Deref for AdminUser {
    type Target = AuthenticatedUser;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromRequest for AdminUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let auth_user = match AuthenticatedUser::from_request(req, payload).into_inner() {
            Ok(user) => user,
            Err(e) => return ready(Err(e)),
        };

        if !auth_user.is_admin() {
            warn!(user_id = %auth_user.user_id, "User attempted admin access without privileges");
            return ready(Err(AppError::Forbidden.into()));
        }

        ready(Ok(AdminUser(auth_user)))
    }
}

/// Worker extractor
///
/// With a configured `WorkerToken`, a missing bearer is rejected with 401
/// and a different one with 403. Without one, every request passes.
#[derive(Debug, Clone, Copy)]
pub struct WorkerAuth;

impl WorkerAuth {
    fn check(req: &HttpRequest) -> Result<Self, AppError> {
        let expected = req
            .app_data::<web::Data<WorkerToken>>()
            .and_then(|token| token.0.clone());

        let Some(expected) = expected else {
            return Ok(WorkerAuth);
        };

        let presented = extract_bearer(req).ok_or(AppError::MissingBearer)?;
        if presented != expected {
            return Err(AppError::InvalidBearer);
        }

        Ok(WorkerAuth)
    }
}

impl FromRequest for WorkerAuth {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Self::check(req).map_err(|e| {
            warn!(error = %e, path = %req.path(), "Worker authentication failed");
            e.into()
        }))
    }
}
