//! User DTOs
//!
//! Data Transfer Objects for user provisioning.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;
use voxroute_core::models::{NewUser, User};

/// Request to provision a user
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(max = 100, message = "display_name is too long"))]
    pub display_name: Option<String>,

    #[serde(default)]
    pub is_admin: bool,
}

impl From<CreateUserRequest> for NewUser {
    fn from(req: CreateUserRequest) -> Self {
        Self {
            email: req.email.trim().to_lowercase(),
            display_name: req
                .display_name
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty()),
            is_admin: req.is_admin,
        }
    }
}

/// Request to change the admin flag
#[derive(Debug, Clone, Deserialize)]
pub struct SetAdminRequest {
    pub is_admin: bool,
}

/// Response containing user information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub is_admin: bool,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            role: user.role().to_string(),
            id: user.id,
            email: user.email,
            display_name: user.display_name,
            is_admin: user.is_admin,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// A provisioned user and a bearer token for them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionedUserResponse {
    pub user: UserResponse,
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_user_request_validation() {
        let req = CreateUserRequest {
            email: "ops@example.com".to_string(),
            display_name: None,
            is_admin: false,
        };
        assert!(req.validate().is_ok());

        let req = CreateUserRequest {
            email: "not-an-email".to_string(),
            display_name: None,
            is_admin: false,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_new_user_normalizes_fields() {
        let new_user: NewUser = CreateUserRequest {
            email: " Ops@Example.com ".to_string(),
            display_name: Some("   ".to_string()),
            is_admin: true,
        }
        .into();

        assert_eq!(new_user.email, "ops@example.com");
        assert_eq!(new_user.display_name, None);
        assert!(new_user.is_admin);
    }

    #[test]
    fn test_user_response_role() {
        let user = User {
            is_admin: true,
            ..User::default()
        };
        assert_eq!(UserResponse::from(user).role, "admin");
    }
}
