//! User model
//!
//! Represents the people who request calls. Users are provisioned by an admin
//! and only ever mutated through the admin flag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// User role carried in bearer tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Regular user
    #[default]
    User,
    /// Administrator: bypasses quotas and may manage users
    Admin,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::User => write!(f, "user"),
            UserRole::Admin => write!(f, "admin"),
        }
    }
}

impl UserRole {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "user" => Some(UserRole::User),
            "admin" => Some(UserRole::Admin),
            _ => None,
        }
    }

    /// Check if role has admin privileges
    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin)
    }
}

/// User entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Opaque identifier
    pub id: Uuid,

    /// Contact email (unique)
    pub email: String,

    /// Display name
    pub display_name: Option<String>,

    /// Bypasses every quota check in the routing policy
    pub is_admin: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Role to embed in a bearer token for this user
    pub fn role(&self) -> UserRole {
        if self.is_admin {
            UserRole::Admin
        } else {
            UserRole::User
        }
    }
}

impl Default for User {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email: String::new(),
            display_name: None,
            is_admin: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Data for provisioning a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub display_name: Option<String>,
    pub is_admin: bool,
}
