//! `/moderations` endpoint — the content-safety oracle.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::OracleError;
use crate::openai::{OpenAiClient, api_error};
use crate::pipeline::types::SafetyOracle;

const ENDPOINT: &str = "moderations";

#[derive(Debug, Serialize)]
struct ModerationRequest<'a> {
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct ModerationResponse {
    results: Vec<ModerationResult>,
}

#[derive(Debug, Deserialize)]
struct ModerationResult {
    flagged: bool,
}

#[async_trait]
impl SafetyOracle for OpenAiClient {
    async fn is_flagged(&self, text: &str) -> Result<bool, OracleError> {
        let response = self
            .http
            .post(self.url(ENDPOINT))
            .bearer_auth(self.api_key())
            .json(&ModerationRequest { input: text })
            .send()
            .await
            .map_err(|e| OracleError::Request {
                endpoint: ENDPOINT.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(ENDPOINT, status.as_u16(), &body));
        }

        let parsed: ModerationResponse =
            response.json().await.map_err(|e| OracleError::InvalidResponse {
                endpoint: ENDPOINT.to_string(),
                reason: format!("failed to parse response: {e}"),
            })?;

        // One input, one result; an empty array means the oracle did not
        // actually screen the text.
        let verdict = parsed
            .results
            .first()
            .ok_or_else(|| OracleError::InvalidResponse {
                endpoint: ENDPOINT.to_string(),
                reason: "empty results array".to_string(),
            })?;

        debug!(flagged = verdict.flagged, "moderation verdict received");
        Ok(verdict.flagged)
    }
}
