//! Weekly usage window and ledger snapshot
//!
//! The ledger is derived from call rows on every read; there is no stored
//! counter and no reset job. A week starts Monday 00:00 UTC.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::Serialize;

/// Half-open calendar week `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl UsageWindow {
    /// The week containing `at`
    pub fn containing(at: DateTime<Utc>) -> Self {
        let date = at.date_naive();
        let monday = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
        let start = Utc.from_utc_datetime(&monday.and_time(chrono::NaiveTime::MIN));

        Self {
            start,
            end: start + Duration::days(7),
        }
    }

    /// Whether `ts` falls inside this week
    #[inline]
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }
}

/// Ledger figures a routing decision is made from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LedgerSnapshot {
    pub window: UsageWindow,

    /// Cost of every call completed this week, all users
    pub weekly_cost_cents: i64,

    /// Calls the requesting user created this week
    pub user_weekly_call_count: i64,
}
