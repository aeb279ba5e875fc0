//! OpenAI-compatible oracle client.
//!
//! Moderation and speech synthesis share one HTTP client, one credential,
//! and one error envelope; the per-endpoint calls live in the submodules as
//! trait impls on [`OpenAiClient`].

mod moderation;
mod speech;

use std::time::Duration;

use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;

use crate::config::OracleConfig;
use crate::error::OracleError;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for OpenAI-style endpoints. Implements both the safety-oracle and
/// speech-synthesizer seams.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: Client,
    config: OracleConfig,
}

impl OpenAiClient {
    pub fn new(config: OracleConfig) -> Result<Self, OracleError> {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| OracleError::Request {
                endpoint: "client".to_string(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { http, config })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.config.base_url, endpoint)
    }

    fn api_key(&self) -> &str {
        self.config.api_key.expose_secret()
    }
}

/// Standard OpenAI error envelope: `{"error": {"message", "type", "code"}}`.
#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(default)]
    code: Option<String>,
}

/// Map a non-success response body to a typed oracle error.
fn api_error(endpoint: &str, status: u16, body: &str) -> OracleError {
    if let Ok(parsed) = serde_json::from_str::<ApiErrorEnvelope>(body) {
        if parsed.error.code.as_deref() == Some("rate_limit_exceeded") {
            return OracleError::RateLimited {
                endpoint: endpoint.to_string(),
            };
        }
        return OracleError::Api {
            endpoint: endpoint.to_string(),
            status,
            message: parsed.error.message,
        };
    }
    // Not the standard envelope; keep a truncated body for the log line.
    OracleError::Api {
        endpoint: endpoint.to_string(),
        status,
        message: body.chars().take(200).collect(),
    }
}
