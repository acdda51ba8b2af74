//! JWT Claims structure
//!
//! Defines the claims carried by user bearer tokens.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use voxroute_core::models::UserRole;

/// JWT Claims
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,

    /// User role
    pub role: UserRole,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    /// Create new claims for a user; expiration is filled in by `JwtService`
    ///
    /// # Examples
    ///
    /// ```
    /// use uuid::Uuid;
    /// use voxroute_auth::Claims;
    /// use voxroute_core::models::UserRole;
    ///
    /// let id = Uuid::new_v4();
    /// let claims = Claims::new(id, UserRole::Admin);
    /// assert_eq!(claims.user_id(), Some(id));
    /// ```
    pub fn new(user_id: Uuid, role: UserRole) -> Self {
        Self {
            sub: user_id.to_string(),
            role,
            iat: Utc::now().timestamp(),
            exp: 0,
        }
    }

    /// Create new claims with custom expiration duration
    pub fn with_expiration(user_id: Uuid, role: UserRole, expires_in_secs: i64) -> Self {
        let now = Utc::now();
        let exp = now + Duration::seconds(expires_in_secs);

        Self {
            sub: user_id.to_string(),
            role,
            iat: now.timestamp(),
            exp: exp.timestamp(),
        }
    }

    /// Check if the token is expired
    pub fn is_expired(&self) -> bool {
        self.exp <= Utc::now().timestamp()
    }

    /// The subject as a user id; `None` when the subject is not a UUID
    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_with_expiration() {
        let id = Uuid::new_v4();
        let claims = Claims::with_expiration(id, UserRole::User, 3600);
        assert_eq!(claims.sub, id.to_string());
        assert!(!claims.is_expired());

        let now = Utc::now().timestamp();
        assert!(claims.exp > now);
        assert!(claims.exp <= now + 3600);
    }

    #[test]
    fn test_expired_claims() {
        let mut claims = Claims::new(Uuid::new_v4(), UserRole::User);
        claims.exp = (Utc::now() - Duration::hours(1)).timestamp();
        assert!(claims.is_expired());
    }

    #[test]
    fn test_non_uuid_subject() {
        let mut claims = Claims::new(Uuid::new_v4(), UserRole::Admin);
        claims.sub = "admin".to_string();
        assert_eq!(claims.user_id(), None);
        assert!(claims.is_admin());
    }
}
