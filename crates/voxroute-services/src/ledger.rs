//! Weekly usage ledger
//!
//! Recomputed from call rows on every read. Nothing is stored and nothing is
//! reset; a new week simply has no rows yet.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;
use voxroute_core::models::{LedgerSnapshot, UsageWindow};
use voxroute_core::traits::CallRepository;
use voxroute_core::AppResult;

pub struct UsageLedger {
    calls: Arc<dyn CallRepository>,
}

impl UsageLedger {
    pub fn new(calls: Arc<dyn CallRepository>) -> Self {
        Self { calls }
    }

    /// Ledger figures for the week containing `now`
    ///
    /// Cost counts every call completed in the window, all users. The call
    /// count counts every call `user_id` created in the window, whatever its
    /// status.
    #[instrument(skip(self))]
    pub async fn snapshot(&self, user_id: Uuid, now: DateTime<Utc>) -> AppResult<LedgerSnapshot> {
        let window = UsageWindow::containing(now);

        let weekly_cost_cents = self.calls.sum_completed_cost(window.start, window.end).await?;
        let user_weekly_call_count = self
            .calls
            .count_created_by_user(user_id, window.start, window.end)
            .await?;

        debug!(
            weekly_cost_cents,
            user_weekly_call_count,
            week_start = %window.start,
            "Ledger snapshot"
        );

        Ok(LedgerSnapshot {
            window,
            weekly_cost_cents,
            user_weekly_call_count,
        })
    }
}
