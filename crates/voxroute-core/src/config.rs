//! Application configuration
//!
//! This module provides centralized configuration management using the `config` crate.
//! Configuration can be loaded from environment variables and config files.

use crate::models::RoutingType;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub premium: PremiumConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_workers() -> usize {
    num_cpus::get()
}

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

/// Authentication configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// JWT signing secret
    pub jwt_secret: String,

    /// Lifetime of tokens minted by the admin endpoint, in seconds
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration_secs: i64,

    /// Shared bearer token for the budget worker endpoints.
    /// When unset those endpoints are open.
    #[serde(default)]
    pub worker_token: Option<String>,
}

fn default_jwt_expiration() -> i64 {
    86_400
}

/// Managed voice-agent platform (premium route) configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PremiumConfig {
    /// Platform API key
    #[serde(default)]
    pub api_key: Option<String>,

    /// Conversational agent identifier
    #[serde(default)]
    pub agent_id: Option<String>,

    /// Originating phone-number identifier registered with the platform
    #[serde(default)]
    pub agent_phone_number_id: Option<String>,

    /// API root
    #[serde(default = "default_premium_base_url")]
    pub base_url: String,

    /// Dispatch request timeout in seconds
    #[serde(default = "default_premium_timeout")]
    pub timeout_secs: u64,
}

fn default_premium_base_url() -> String {
    "https://api.elevenlabs.io".to_string()
}

fn default_premium_timeout() -> u64 {
    15
}

impl Default for PremiumConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            agent_id: None,
            agent_phone_number_id: None,
            base_url: default_premium_base_url(),
            timeout_secs: default_premium_timeout(),
        }
    }
}

impl PremiumConfig {
    /// True only when every credential the premium route needs is present
    pub fn is_configured(&self) -> bool {
        [&self.api_key, &self.agent_id, &self.agent_phone_number_id]
            .iter()
            .all(|v| v.as_deref().is_some_and(|s| !s.trim().is_empty()))
    }
}

/// Quota and pricing configuration consumed by the routing policy
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RoutingConfig {
    /// Weekly spend limit across all users, in cents
    #[serde(default = "default_weekly_cost_limit")]
    pub weekly_cost_limit_cents: i64,

    /// Weekly premium-eligible calls per user
    #[serde(default = "default_weekly_calls_per_user")]
    pub weekly_calls_per_user: i64,

    /// Premium route price per started minute, in cents
    #[serde(default = "default_premium_rate")]
    pub premium_rate_cents_per_minute: i64,

    /// Budget route price per started minute, in cents
    #[serde(default = "default_budget_rate")]
    pub budget_rate_cents_per_minute: i64,
}

fn default_weekly_cost_limit() -> i64 {
    2000
}

fn default_weekly_calls_per_user() -> i64 {
    4
}

fn default_premium_rate() -> i64 {
    10
}

fn default_budget_rate() -> i64 {
    2
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            weekly_cost_limit_cents: default_weekly_cost_limit(),
            weekly_calls_per_user: default_weekly_calls_per_user(),
            premium_rate_cents_per_minute: default_premium_rate(),
            budget_rate_cents_per_minute: default_budget_rate(),
        }
    }
}

impl RoutingConfig {
    /// Per-minute rate for a route
    pub fn rate_for(&self, route: RoutingType) -> i64 {
        match route {
            RoutingType::ElevenlabsAgent => self.premium_rate_cents_per_minute,
            RoutingType::TwilioCustom => self.budget_rate_cents_per_minute,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("database.max_connections", 10)?
            .set_default("auth.jwt_expiration_secs", 86_400)?
            .set_default("premium.base_url", default_premium_base_url())?
            .set_default("premium.timeout_secs", 15)?
            .set_default("routing.weekly_cost_limit_cents", 2000)?
            .set_default("routing.weekly_calls_per_user", 4)?
            .set_default("routing.premium_rate_cents_per_minute", 10)?
            .set_default("routing.budget_rate_cents_per_minute", 2)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables with VOXROUTE prefix
            .add_source(
                Environment::with_prefix("VOXROUTE")
                    .separator("__")
                    .try_parsing(true),
            )
            // Conventional DATABASE_URL wins when present
            .set_override_option("database.url", env::var("DATABASE_URL").ok())?
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("VOXROUTE").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Get the server bind address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_routing_config() {
        let config = RoutingConfig::default();
        assert_eq!(config.weekly_cost_limit_cents, 2000);
        assert_eq!(config.weekly_calls_per_user, 4);
        assert_eq!(config.rate_for(RoutingType::ElevenlabsAgent), 10);
        assert_eq!(config.rate_for(RoutingType::TwilioCustom), 2);
    }

    #[test]
    fn test_premium_requires_all_credentials() {
        let mut premium = PremiumConfig::default();
        assert!(!premium.is_configured());

        premium.api_key = Some("xi-key".to_string());
        premium.agent_id = Some("agent_123".to_string());
        assert!(!premium.is_configured());

        premium.agent_phone_number_id = Some("  ".to_string());
        assert!(!premium.is_configured());

        premium.agent_phone_number_id = Some("phnum_456".to_string());
        assert!(premium.is_configured());
    }
}
