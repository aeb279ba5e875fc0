//! `/audio/speech` endpoint — the speech-synthesis oracle.

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::error::OracleError;
use crate::openai::{OpenAiClient, api_error};
use crate::pipeline::types::SpeechSynthesizer;
use crate::pipeline::voice::Voice;

const ENDPOINT: &str = "audio/speech";

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: Voice,
    response_format: &'a str,
}

#[async_trait]
impl SpeechSynthesizer for OpenAiClient {
    async fn synthesize(&self, text: &str, voice: Voice) -> Result<Vec<u8>, OracleError> {
        let request = SpeechRequest {
            model: &self.config.tts_model,
            input: text,
            voice,
            response_format: "mp3",
        };

        let response = self
            .http
            .post(self.url(ENDPOINT))
            .bearer_auth(self.api_key())
            .json(&request)
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

        let audio = response.bytes().await.map_err(|e| OracleError::Request {
            endpoint: ENDPOINT.to_string(),
            reason: format!("failed to read audio body: {e}"),
        })?;

        if audio.is_empty() {
            return Err(OracleError::InvalidResponse {
                endpoint: ENDPOINT.to_string(),
                reason: "empty audio body".to_string(),
            });
        }

        debug!(bytes = audio.len(), voice = %voice, "speech synthesized");
        Ok(audio.to_vec())
    }
}
