//! Call event repository implementation
//!
//! The audit trail is append-only: there is no update or delete here.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;
use voxroute_core::{
    models::{CallEvent, CallEventType, NewCallEvent},
    traits::CallEventRepository,
    AppError, AppResult,
};

/// PostgreSQL implementation of CallEventRepository
pub struct PgCallEventRepository {
    pool: PgPool,
}

impl PgCallEventRepository {
    /// Create a new call event repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: sqlx::postgres::PgRow) -> CallEvent {
        let event_type: String = row.get("event_type");
        CallEvent {
            id: row.get("id"),
            call_id: row.get("call_id"),
            event_type: CallEventType::from_str(&event_type).unwrap_or_else(|| {
                warn!("Unknown call event type in database: {}", event_type);
                CallEventType::Error
            }),
            payload: row.get("payload"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl CallEventRepository for PgCallEventRepository {
    #[instrument(skip(self, event), fields(call_id = %event.call_id, event_type = %event.event_type))]
    async fn append(&self, event: &NewCallEvent) -> AppResult<CallEvent> {
        debug!("Appending call event");

        let row = sqlx::query(
            r#"
            INSERT INTO call_events (call_id, event_type, payload)
            VALUES ($1, $2, $3)
            RETURNING id, call_id, event_type, payload, created_at
            "#,
        )
        .bind(event.call_id)
        .bind(event.event_type.to_string())
        .bind(&event.payload)
        .map(Self::map_row)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error appending call event: {}", e);
            AppError::Database(format!("Failed to append call event: {}", e))
        })?;

        Ok(row)
    }

    #[instrument(skip(self))]
    async fn list_for_call(&self, call_id: Uuid) -> AppResult<Vec<CallEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, call_id, event_type, payload, created_at
            FROM call_events
            WHERE call_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(call_id)
        .map(Self::map_row)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing events for call {}: {}", call_id, e);
            AppError::Database(format!("Failed to list call events: {}", e))
        })?;

        Ok(rows)
    }
}
