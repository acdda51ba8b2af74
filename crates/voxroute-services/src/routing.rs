//! Routing policy
//!
//! Picks the premium or budget route for a new call. The rules are checked in
//! order and the first match wins:
//!
//! 1. premium route not configured → budget
//! 2. admin → premium
//! 3. weekly cost across all users at or over the limit → budget
//! 4. this user's weekly calls at or over the limit → budget
//! 5. otherwise → premium

use serde::Serialize;
use std::fmt;
use voxroute_core::config::RoutingConfig;
use voxroute_core::models::{LedgerSnapshot, RoutingType, User};

/// Which rule decided the route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteReason {
    PremiumNotConfigured,
    AdminOverride,
    WeeklyCostLimitReached,
    UserCallLimitReached,
    WithinLimits,
}

impl fmt::Display for RouteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RouteReason::PremiumNotConfigured => "premium_not_configured",
            RouteReason::AdminOverride => "admin_override",
            RouteReason::WeeklyCostLimitReached => "weekly_cost_limit_reached",
            RouteReason::UserCallLimitReached => "user_call_limit_reached",
            RouteReason::WithinLimits => "within_limits",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RouteDecision {
    pub route: RoutingType,
    pub reason: RouteReason,
}

impl RouteDecision {
    fn premium(reason: RouteReason) -> Self {
        Self {
            route: RoutingType::ElevenlabsAgent,
            reason,
        }
    }

    fn budget(reason: RouteReason) -> Self {
        Self {
            route: RoutingType::TwilioCustom,
            reason,
        }
    }
}

/// Decide the route for a call `user` is about to place.
///
/// Pure: the same inputs always give the same decision.
pub fn decide_route(
    user: &User,
    snapshot: &LedgerSnapshot,
    premium_enabled: bool,
    config: &RoutingConfig,
) -> RouteDecision {
    if !premium_enabled {
        return RouteDecision::budget(RouteReason::PremiumNotConfigured);
    }
    if user.is_admin {
        return RouteDecision::premium(RouteReason::AdminOverride);
    }
    if snapshot.weekly_cost_cents >= config.weekly_cost_limit_cents {
        return RouteDecision::budget(RouteReason::WeeklyCostLimitReached);
    }
    if snapshot.user_weekly_call_count >= config.weekly_calls_per_user {
        return RouteDecision::budget(RouteReason::UserCallLimitReached);
    }
    RouteDecision::premium(RouteReason::WithinLimits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use voxroute_core::models::UsageWindow;

    fn snapshot(weekly_cost_cents: i64, user_weekly_call_count: i64) -> LedgerSnapshot {
        LedgerSnapshot {
            window: UsageWindow::containing(Utc::now()),
            weekly_cost_cents,
            user_weekly_call_count,
        }
    }

    fn user(is_admin: bool) -> User {
        User {
            is_admin,
            ..Default::default()
        }
    }

    #[test]
    fn test_within_limits_goes_premium() {
        let decision = decide_route(&user(false), &snapshot(1500, 3), true, &RoutingConfig::default());
        assert_eq!(decision.route, RoutingType::ElevenlabsAgent);
        assert_eq!(decision.reason, RouteReason::WithinLimits);
    }

    #[test]
    fn test_unconfigured_premium_always_budget() {
        let config = RoutingConfig::default();
        for (admin, cost, count) in [(true, 0, 0), (false, 0, 0), (true, 5000, 10)] {
            let decision = decide_route(&user(admin), &snapshot(cost, count), false, &config);
            assert_eq!(decision.route, RoutingType::TwilioCustom);
            assert_eq!(decision.reason, RouteReason::PremiumNotConfigured);
        }
    }

    #[test]
    fn test_admin_overrides_cost_limit() {
        let decision = decide_route(&user(true), &snapshot(2000, 9), true, &RoutingConfig::default());
        assert_eq!(decision.route, RoutingType::ElevenlabsAgent);
        assert_eq!(decision.reason, RouteReason::AdminOverride);
    }

    #[test]
    fn test_cost_limit_is_inclusive_and_checked_before_user_limit() {
        let config = RoutingConfig::default();

        let decision = decide_route(&user(false), &snapshot(2000, 4), true, &config);
        assert_eq!(decision.route, RoutingType::TwilioCustom);
        assert_eq!(decision.reason, RouteReason::WeeklyCostLimitReached);

        let decision = decide_route(&user(false), &snapshot(1999, 3), true, &config);
        assert_eq!(decision.route, RoutingType::ElevenlabsAgent);
    }

    #[test]
    fn test_user_call_limit() {
        let decision = decide_route(&user(false), &snapshot(0, 4), true, &RoutingConfig::default());
        assert_eq!(decision.route, RoutingType::TwilioCustom);
        assert_eq!(decision.reason, RouteReason::UserCallLimitReached);
    }

    #[test]
    fn test_decision_is_stable() {
        let config = RoutingConfig::default();
        let (u, s) = (user(false), snapshot(100, 1));
        assert_eq!(
            decide_route(&u, &s, true, &config),
            decide_route(&u, &s, true, &config)
        );
    }

    #[test]
    fn test_reason_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(RouteReason::UserCallLimitReached).unwrap(),
            "user_call_limit_reached"
        );
        assert_eq!(RouteReason::AdminOverride.to_string(), "admin_override");
    }
}
