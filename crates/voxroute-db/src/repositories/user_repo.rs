//! User repository implementation
//!
//! Users are provisioned by an admin; there is no self-service signup and no
//! password storage. Identity comes from a signed token.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{debug, error, instrument};
use uuid::Uuid;
use voxroute_core::{
    models::{NewUser, User},
    traits::UserRepository,
    AppError, AppResult,
};

/// PostgreSQL implementation of UserRepository
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: sqlx::postgres::PgRow) -> User {
        User {
            id: row.get("id"),
            email: row.get("email"),
            display_name: row.get("display_name"),
            is_admin: row.get("is_admin"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        debug!("Finding user by id: {}", id);

        let result = sqlx::query(
            r#"
            SELECT id, email, display_name, is_admin, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .map(Self::map_row)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding user {}: {}", id, e);
            AppError::Database(format!("Failed to find user: {}", e))
        })?;

        Ok(result)
    }

    #[instrument(skip(self))]
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        debug!("Finding user by email: {}", email);

        let result = sqlx::query(
            r#"
            SELECT id, email, display_name, is_admin, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .map(Self::map_row)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding user by email: {}", e);
            AppError::Database(format!("Failed to find user: {}", e))
        })?;

        Ok(result)
    }

    #[instrument(skip(self, user), fields(email = %user.email))]
    async fn create(&self, user: &NewUser) -> AppResult<User> {
        debug!("Creating user");

        let row = sqlx::query(
            r#"
            INSERT INTO users (id, email, display_name, is_admin)
            VALUES ($1, $2, $3, $4)
            RETURNING id, email, display_name, is_admin, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(user.is_admin)
        .map(Self::map_row)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            let unique_violation = e
                .as_database_error()
                .map(|db| db.is_unique_violation())
                .unwrap_or(false);
            if unique_violation {
                AppError::AlreadyExists(format!("User {} already exists", user.email))
            } else {
                error!("Database error creating user: {}", e);
                AppError::Database(format!("Failed to create user: {}", e))
            }
        })?;

        Ok(row)
    }

    #[instrument(skip(self))]
    async fn set_admin(&self, id: Uuid, is_admin: bool) -> AppResult<Option<User>> {
        debug!("Setting admin flag for user {} to {}", id, is_admin);

        let row = sqlx::query(
            r#"
            UPDATE users
            SET is_admin = $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, email, display_name, is_admin, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(is_admin)
        .map(Self::map_row)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating user {}: {}", id, e);
            AppError::Database(format!("Failed to update user: {}", e))
        })?;

        Ok(row)
    }
}
