//! Premium platform dispatcher
//!
//! One HTTP request per call, no retries. Any failure is returned to the
//! controller, which falls the call back to the budget route.

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use voxroute_core::config::PremiumConfig;
use voxroute_core::models::CallTask;
use voxroute_core::traits::{DispatchReceipt, PremiumDispatcher};
use voxroute_core::DispatchError;

use crate::constants::{MAX_ERROR_BODY_CHARS, OUTBOUND_CALL_PATH};

#[derive(Debug, Serialize)]
struct OutboundCallRequest<'a> {
    agent_id: &'a str,
    agent_phone_number_id: &'a str,
    to_number: &'a str,
    conversation_initiation_client_data: ClientData<'a>,
}

#[derive(Debug, Serialize)]
struct ClientData<'a> {
    dynamic_variables: DynamicVariables<'a>,
}

#[derive(Debug, Serialize)]
struct DynamicVariables<'a> {
    call_id: String,
    target_name: &'a str,
    objective: &'a str,
    context: &'a str,
}

/// HTTP client for the managed voice-agent platform
pub struct ElevenLabsDispatcher {
    http_client: Client,
    endpoint: String,
    api_key: String,
    agent_id: String,
    agent_phone_number_id: String,
    timeout_secs: u64,
}

impl ElevenLabsDispatcher {
    /// Build a dispatcher from configuration
    ///
    /// # Errors
    ///
    /// `DispatchError::NotConfigured` when a credential is missing,
    /// `DispatchError::Connection` when the HTTP client cannot be built.
    pub fn new(config: &PremiumConfig) -> Result<Self, DispatchError> {
        if !config.is_configured() {
            return Err(DispatchError::NotConfigured);
        }
        let credential = |v: &Option<String>| v.as_deref().unwrap_or_default().trim().to_string();

        let http_client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| DispatchError::Connection(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: format!(
                "{}{}",
                config.base_url.trim_end_matches('/'),
                OUTBOUND_CALL_PATH
            ),
            api_key: credential(&config.api_key),
            agent_id: credential(&config.agent_id),
            agent_phone_number_id: credential(&config.agent_phone_number_id),
            timeout_secs: config.timeout_secs,
        })
    }

    fn map_send_error(&self, e: reqwest::Error) -> DispatchError {
        if e.is_timeout() {
            DispatchError::Timeout(self.timeout_secs)
        } else {
            DispatchError::Connection(e.to_string())
        }
    }
}

/// Pull a string field out of a JSON object, if present
fn string_field(body: &JsonValue, key: &str) -> Option<String> {
    body.get(key).and_then(JsonValue::as_str).map(str::to_string)
}

#[async_trait]
impl PremiumDispatcher for ElevenLabsDispatcher {
    #[instrument(skip(self, call), fields(call_id = %call.id))]
    async fn dispatch(&self, call: &CallTask) -> Result<DispatchReceipt, DispatchError> {
        let request = OutboundCallRequest {
            agent_id: &self.agent_id,
            agent_phone_number_id: &self.agent_phone_number_id,
            to_number: &call.target_phone,
            conversation_initiation_client_data: ClientData {
                dynamic_variables: DynamicVariables {
                    call_id: call.id.to_string(),
                    target_name: &call.target_name,
                    objective: &call.objective,
                    context: call.context.as_deref().unwrap_or_default(),
                },
            },
        };

        debug!("Dispatching call to premium platform");

        let response = self
            .http_client
            .post(&self.endpoint)
            .header("xi-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_send_error(e))?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "Premium platform rejected the call");
            return Err(DispatchError::HttpStatus {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let parsed: JsonValue = serde_json::from_str(&body)
            .map_err(|e| DispatchError::MalformedResponse(format!("Response is not JSON: {}", e)))?;

        let receipt = DispatchReceipt {
            status: status.as_u16(),
            conversation_id: string_field(&parsed, "conversation_id"),
            carrier_call_sid: string_field(&parsed, "callSid"),
        };

        debug!(conversation_id = ?receipt.conversation_id, "Premium platform accepted the call");

        Ok(receipt)
    }
}
