//! Call task repository implementation
//!
//! Status changes are compare-and-set updates keyed on `(id, status)`, so two
//! webhook deliveries racing on the same call can never both apply.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;
use voxroute_core::{
    models::{CallStatus, CallTask, NewCallTask, RoutingType},
    traits::CallRepository,
    AppError, AppResult,
};

const CALL_COLUMNS: &str = r#"
    id, user_id, target_phone, target_name, objective, context,
    status, routing_type, cost_cents, duration_seconds, summary,
    failure_reason, carrier_call_sid,
    created_at, started_at, completed_at, updated_at
"#;

/// PostgreSQL implementation of CallRepository
pub struct PgCallRepository {
    pool: PgPool,
}

impl PgCallRepository {
    /// Create a new call repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Parse call status from string
    fn parse_status(s: &str) -> CallStatus {
        CallStatus::from_str(s).unwrap_or_else(|| {
            error!("Unknown call status in database: {}", s);
            CallStatus::Failed
        })
    }

    /// Parse routing type from string
    fn parse_routing(s: &str) -> RoutingType {
        RoutingType::from_str(s).unwrap_or(RoutingType::TwilioCustom)
    }
}

#[async_trait]
impl CallRepository for PgCallRepository {
    #[instrument(skip(self, call), fields(user_id = %call.user_id))]
    async fn create(&self, call: &NewCallTask) -> AppResult<CallTask> {
        debug!("Creating {} call", call.routing_type);

        let sql = format!(
            r#"
            INSERT INTO call_tasks (
                id, user_id, target_phone, target_name, objective, context,
                status, routing_type
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'scheduled', $7)
            RETURNING {CALL_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<sqlx::Postgres, CallRow>(&sql)
            .bind(Uuid::now_v7())
            .bind(call.user_id)
            .bind(&call.request.target_phone)
            .bind(&call.request.target_name)
            .bind(&call.request.objective)
            .bind(&call.request.context)
            .bind(call.routing_type.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error creating call: {}", e);
                AppError::Database(format!("Failed to create call: {}", e))
            })?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<CallTask>> {
        debug!("Finding call by id: {}", id);

        let sql = format!("SELECT {CALL_COLUMNS} FROM call_tasks WHERE id = $1");

        let row = sqlx::query_as::<sqlx::Postgres, CallRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding call {}: {}", id, e);
                AppError::Database(format!("Failed to find call: {}", e))
            })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_by_carrier_sid(&self, carrier_call_sid: &str) -> AppResult<Option<CallTask>> {
        debug!("Finding call by carrier sid: {}", carrier_call_sid);

        let sql = format!("SELECT {CALL_COLUMNS} FROM call_tasks WHERE carrier_call_sid = $1");

        let row = sqlx::query_as::<sqlx::Postgres, CallRow>(&sql)
            .bind(carrier_call_sid)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding call by carrier sid: {}", e);
                AppError::Database(format!("Failed to find call: {}", e))
            })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn list_by_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<CallTask>, i64)> {
        debug!(
            "Listing calls for user {} with limit {} offset {}",
            user_id, limit, offset
        );

        let sql = format!(
            r#"
            SELECT {CALL_COLUMNS}
            FROM call_tasks
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        );

        let rows = sqlx::query_as::<sqlx::Postgres, CallRow>(&sql)
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error listing calls: {}", e);
                AppError::Database(format!("Failed to list calls: {}", e))
            })?;

        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM call_tasks WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error counting calls: {}", e);
                AppError::Database(format!("Failed to count calls: {}", e))
            })?;

        Ok((rows.into_iter().map(Into::into).collect(), total.0))
    }

    #[instrument(skip(self))]
    async fn list_pending(&self) -> AppResult<Vec<CallTask>> {
        let sql = format!(
            r#"
            SELECT {CALL_COLUMNS}
            FROM call_tasks
            WHERE status = 'scheduled' AND routing_type = 'twilio_custom'
            ORDER BY created_at ASC
            "#
        );

        let rows = sqlx::query_as::<sqlx::Postgres, CallRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error listing pending calls: {}", e);
                AppError::Database(format!("Failed to list pending calls: {}", e))
            })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, next), fields(call_id = %next.id, to = %next.status))]
    async fn compare_and_set(
        &self,
        next: &CallTask,
        current: &CallTask,
    ) -> AppResult<Option<CallTask>> {
        debug!("Compare-and-set call {} from {}", next.id, current.status);

        let sql = format!(
            r#"
            UPDATE call_tasks
            SET status = $3,
                routing_type = $4,
                cost_cents = $5,
                duration_seconds = $6,
                summary = $7,
                failure_reason = $8,
                carrier_call_sid = COALESCE(carrier_call_sid, $9),
                started_at = COALESCE(started_at, $10),
                completed_at = COALESCE(completed_at, $11),
                updated_at = $12
            WHERE id = $1 AND status = $2 AND updated_at = $13
            RETURNING {CALL_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<sqlx::Postgres, CallRow>(&sql)
            .bind(next.id)
            .bind(current.status.to_string())
            .bind(next.status.to_string())
            .bind(next.routing_type.to_string())
            .bind(next.cost_cents)
            .bind(next.duration_seconds)
            .bind(&next.summary)
            .bind(&next.failure_reason)
            .bind(&next.carrier_call_sid)
            .bind(next.started_at)
            .bind(next.completed_at)
            .bind(next.updated_at)
            .bind(current.updated_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                let unique_violation = e
                    .as_database_error()
                    .map(|db| db.is_unique_violation())
                    .unwrap_or(false);
                if unique_violation {
                    AppError::AlreadyExists(format!(
                        "carrier call sid {} is already bound to another call",
                        next.carrier_call_sid.as_deref().unwrap_or_default()
                    ))
                } else {
                    error!("Database error updating call {}: {}", next.id, e);
                    AppError::Database(format!("Failed to update call: {}", e))
                }
            })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn count_created_by_user(
        &self,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<i64> {
        let result: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM call_tasks
            WHERE user_id = $1
                AND created_at >= $2
                AND created_at < $3
            "#,
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error counting weekly calls: {}", e);
            AppError::Database(format!("Failed to count weekly calls: {}", e))
        })?;

        Ok(result.0)
    }

    #[instrument(skip(self))]
    async fn sum_completed_cost(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> AppResult<i64> {
        let result: (i64,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(cost_cents), 0)::BIGINT
            FROM call_tasks
            WHERE status = 'completed'
                AND completed_at >= $1
                AND completed_at < $2
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error summing weekly cost: {}", e);
            AppError::Database(format!("Failed to sum weekly cost: {}", e))
        })?;

        Ok(result.0)
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct CallRow {
    id: Uuid,
    user_id: Uuid,
    target_phone: String,
    target_name: String,
    objective: String,
    context: Option<String>,
    status: String,
    routing_type: String,
    cost_cents: Option<i64>,
    duration_seconds: Option<i64>,
    summary: Option<String>,
    failure_reason: Option<String>,
    carrier_call_sid: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl From<CallRow> for CallTask {
    fn from(row: CallRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            target_phone: row.target_phone,
            target_name: row.target_name,
            objective: row.objective,
            context: row.context,
            status: PgCallRepository::parse_status(&row.status),
            routing_type: PgCallRepository::parse_routing(&row.routing_type),
            cost_cents: row.cost_cents,
            duration_seconds: row.duration_seconds,
            summary: row.summary,
            failure_reason: row.failure_reason,
            carrier_call_sid: row.carrier_call_sid,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            updated_at: row.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status() {
        assert_eq!(
            PgCallRepository::parse_status("scheduled"),
            CallStatus::Scheduled
        );
        assert_eq!(
            PgCallRepository::parse_status("in_progress"),
            CallStatus::InProgress
        );
        assert_eq!(
            PgCallRepository::parse_status("cancelled"),
            CallStatus::Cancelled
        );
    }

    #[test]
    fn test_parse_routing() {
        assert_eq!(
            PgCallRepository::parse_routing("elevenlabs_agent"),
            RoutingType::ElevenlabsAgent
        );
        assert_eq!(
            PgCallRepository::parse_routing("twilio_custom"),
            RoutingType::TwilioCustom
        );
    }

    #[test]
    fn test_row_conversion() {
        let now = Utc::now();
        let row = CallRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            target_phone: "+15551234567".to_string(),
            target_name: "Pharmacy".to_string(),
            objective: "Check refill status".to_string(),
            context: None,
            status: "completed".to_string(),
            routing_type: "twilio_custom".to_string(),
            cost_cents: Some(4),
            duration_seconds: Some(61),
            summary: Some("Ready tomorrow".to_string()),
            failure_reason: None,
            carrier_call_sid: Some("CA42".to_string()),
            created_at: now,
            started_at: Some(now),
            completed_at: Some(now),
            updated_at: now,
        };

        let call: CallTask = row.into();
        assert_eq!(call.status, CallStatus::Completed);
        assert_eq!(call.routing_type, RoutingType::TwilioCustom);
        assert_eq!(call.cost_cents, Some(4));
        assert_eq!(call.carrier_call_sid.as_deref(), Some("CA42"));
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_compare_and_set_rejects_stale_status() {
        use voxroute_core::models::{CallRequest, Transition};

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/voxroute".to_string());
        let pool = crate::create_pool(&database_url, Some(2)).await.unwrap();
        crate::run_migrations(&pool).await.unwrap();

        let user_id = Uuid::new_v4();
        sqlx::query("INSERT INTO users (id, email) VALUES ($1, $2)")
            .bind(user_id)
            .bind(format!("{}@example.test", user_id))
            .execute(&pool)
            .await
            .unwrap();

        let repo = PgCallRepository::new(pool);
        let call = repo
            .create(&NewCallTask {
                user_id,
                request: CallRequest {
                    target_phone: "+15551234567".to_string(),
                    target_name: "Bakery".to_string(),
                    objective: "Order a cake".to_string(),
                    context: None,
                },
                routing_type: RoutingType::TwilioCustom,
            })
            .await
            .unwrap();

        let start = voxroute_core::models::CallCommand::Start {
            carrier_call_sid: format!("CA-{}", call.id),
        };
        let Transition::Apply(next) = call.plan(&start, Utc::now()).unwrap() else {
            panic!("expected a transition");
        };

        assert!(repo.compare_and_set(&next, &call).await.unwrap().is_some());
        assert!(repo.compare_and_set(&next, &call).await.unwrap().is_none());
    }
}
