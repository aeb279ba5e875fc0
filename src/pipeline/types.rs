//! Shared types and trait seams for the processing pipeline.

use async_trait::async_trait;

use crate::error::{DispatchError, OracleError};
use crate::pipeline::voice::Voice;

// ── Processing outcome ──────────────────────────────────────────────

/// Terminal result of one message's trip through the pipeline.
///
/// Exactly one per message per cycle. `Sent` is the only outcome with a
/// mailbox side effect (the read flag flips); every other outcome leaves the
/// message unread so the next cycle reconsiders it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingOutcome {
    /// Reply with synthesized audio was accepted by the outbound transport.
    Sent { voice: Voice },
    /// Body exceeded the length gate; no oracle was consulted.
    SkippedTooLong { chars: usize },
    /// Moderation rejected the content, or the safety oracle was
    /// unreachable (fail closed).
    SkippedUnsafe,
    /// No usable plain-text body.
    SkippedNoBody,
    /// Speech oracle call failed; message stays unread for the next cycle.
    FailedSynthesis,
    /// Outbound transport refused the reply; message stays unread.
    FailedSend,
    /// Raw payload would not parse as a message.
    FailedExtraction,
}

impl ProcessingOutcome {
    /// Short stable label for logs and counters.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Sent { .. } => "sent",
            Self::SkippedTooLong { .. } => "skipped_too_long",
            Self::SkippedUnsafe => "skipped_unsafe",
            Self::SkippedNoBody => "skipped_no_body",
            Self::FailedSynthesis => "failed_synthesis",
            Self::FailedSend => "failed_send",
            Self::FailedExtraction => "failed_extraction",
        }
    }

    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }
}

// ── External capability seams ───────────────────────────────────────

/// Content-safety oracle: one call, one verdict.
#[async_trait]
pub trait SafetyOracle: Send + Sync {
    async fn is_flagged(&self, text: &str) -> Result<bool, OracleError>;
}

/// Speech-synthesis oracle: text + voice in, audio bytes out.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice: Voice) -> Result<Vec<u8>, OracleError>;
}

/// Outbound reply capability: composes and sends the audio reply.
#[async_trait]
pub trait ReplyTransport: Send + Sync {
    async fn send_audio_reply(
        &self,
        to: &str,
        subject: &str,
        audio: &[u8],
    ) -> Result<(), DispatchError>;
}
