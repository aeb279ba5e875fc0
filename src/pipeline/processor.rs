//! Pipeline orchestrator — drives one message through extraction, gating,
//! synthesis, and dispatch.
//!
//! **Core invariant: a message is marked read iff its reply was sent.**
//! Every other outcome leaves the read flag alone, so the next cycle picks
//! the message up again (at-least-once).
//!
//! Flow per message:
//! 1. Extract plain-text body (absence and parse failure are distinct)
//! 2. Length gate (no oracle call spent on oversized input)
//! 3. Moderation gate (fail closed on oracle error)
//! 4. Voice selection from the subject
//! 5. Speech synthesis
//! 6. Reply dispatch, then the read-flag acknowledgment

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::mailbox::{InboundEmail, Mailbox};
use crate::pipeline::extract::plain_text_body;
use crate::pipeline::moderation::{ModerationDecision, ModerationGate};
use crate::pipeline::types::{ProcessingOutcome, ReplyTransport, SpeechSynthesizer};
use crate::pipeline::voice::Voice;

/// Per-message pipeline orchestrator.
///
/// Infallible at the seam: `process` always returns an outcome, never an
/// error, so one bad message cannot abort the rest of the batch.
pub struct MessageProcessor {
    mailbox: Arc<dyn Mailbox>,
    moderation: ModerationGate,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    transport: Arc<dyn ReplyTransport>,
    max_body_chars: usize,
}

impl MessageProcessor {
    pub fn new(
        mailbox: Arc<dyn Mailbox>,
        moderation: ModerationGate,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        transport: Arc<dyn ReplyTransport>,
        max_body_chars: usize,
    ) -> Self {
        Self {
            mailbox,
            moderation,
            synthesizer,
            transport,
            max_body_chars,
        }
    }

    /// Run one message end to end and return its terminal outcome.
    pub async fn process(&self, message: &InboundEmail) -> ProcessingOutcome {
        info!(
            uid = message.uid,
            sender = %message.sender,
            subject = %message.subject,
            received_at = ?message.received_at,
            "processing message"
        );

        let body = match plain_text_body(&message.raw) {
            Ok(Some(body)) => body,
            Ok(None) => {
                warn!(uid = message.uid, sender = %message.sender, "no plain-text body");
                return ProcessingOutcome::SkippedNoBody;
            }
            Err(e) => {
                error!(uid = message.uid, sender = %message.sender, "extraction failed: {e}");
                return ProcessingOutcome::FailedExtraction;
            }
        };

        let chars = body.chars().count();
        if chars > self.max_body_chars {
            warn!(
                uid = message.uid,
                sender = %message.sender,
                chars,
                limit = self.max_body_chars,
                "body exceeds length gate"
            );
            return ProcessingOutcome::SkippedTooLong { chars };
        }

        match self.moderation.screen(&message.subject, &body).await {
            ModerationDecision::Rejected => {
                warn!(uid = message.uid, sender = %message.sender, "content rejected");
                return ProcessingOutcome::SkippedUnsafe;
            }
            decision @ (ModerationDecision::Allowed | ModerationDecision::Skipped) => {
                debug!(uid = message.uid, ?decision, "moderation passed");
            }
        }

        let voice = Voice::from_subject(&message.subject);

        let audio = match self.synthesizer.synthesize(&body, voice).await {
            Ok(audio) => audio,
            Err(e) => {
                error!(
                    uid = message.uid,
                    sender = %message.sender,
                    voice = %voice,
                    "synthesis failed: {e}"
                );
                return ProcessingOutcome::FailedSynthesis;
            }
        };

        if let Err(e) = self
            .transport
            .send_audio_reply(&message.sender, &message.subject, &audio)
            .await
        {
            error!(uid = message.uid, sender = %message.sender, "dispatch failed: {e}");
            return ProcessingOutcome::FailedSend;
        }

        // Ack only after the transport accepted the reply. A failed ack
        // keeps the outcome Sent; the message may be resent next cycle.
        if let Err(e) = self.mailbox.mark_read(message.uid).await {
            error!(
                uid = message.uid,
                sender = %message.sender,
                "reply sent but mark-read failed (may resend next cycle): {e}"
            );
        }

        info!(uid = message.uid, sender = %message.sender, voice = %voice, "reply sent");
        ProcessingOutcome::Sent { voice }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::error::{DispatchError, MailboxError, OracleError};
    use crate::pipeline::moderation::ModerationPolicy;
    use crate::pipeline::types::SafetyOracle;

    // ── Test doubles ────────────────────────────────────────────────

    struct MockMailbox {
        marked: AtomicUsize,
        fail_mark: bool,
    }

    impl MockMailbox {
        fn new() -> Self {
            Self {
                marked: AtomicUsize::new(0),
                fail_mark: false,
            }
        }

        fn failing_mark() -> Self {
            Self {
                marked: AtomicUsize::new(0),
                fail_mark: true,
            }
        }
    }

    #[async_trait]
    impl Mailbox for MockMailbox {
        async fn fetch_unread(&self) -> Result<Vec<InboundEmail>, MailboxError> {
            Ok(Vec::new())
        }

        async fn mark_read(&self, _uid: u32) -> Result<(), MailboxError> {
            if self.fail_mark {
                return Err(MailboxError::Protocol("STORE rejected".to_string()));
            }
            self.marked.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct MockOracle {
        flagged: bool,
        calls: AtomicUsize,
    }

    impl MockOracle {
        fn allowing() -> Self {
            Self {
                flagged: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn flagging() -> Self {
            Self {
                flagged: true,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SafetyOracle for MockOracle {
        async fn is_flagged(&self, _text: &str) -> Result<bool, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.flagged)
        }
    }

    struct FailingOracle;

    #[async_trait]
    impl SafetyOracle for FailingOracle {
        async fn is_flagged(&self, _text: &str) -> Result<bool, OracleError> {
            Err(OracleError::Request {
                endpoint: "moderations".to_string(),
                reason: "connection refused".to_string(),
            })
        }
    }

    struct MockSynthesizer {
        fail: bool,
        calls: AtomicUsize,
        last_voice: std::sync::Mutex<Option<Voice>>,
    }

    impl MockSynthesizer {
        fn working() -> Self {
            Self {
                fail: false,
                calls: AtomicUsize::new(0),
                last_voice: std::sync::Mutex::new(None),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                calls: AtomicUsize::new(0),
                last_voice: std::sync::Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl SpeechSynthesizer for MockSynthesizer {
        async fn synthesize(&self, _text: &str, voice: Voice) -> Result<Vec<u8>, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_voice.lock().unwrap() = Some(voice);
            if self.fail {
                return Err(OracleError::Request {
                    endpoint: "audio/speech".to_string(),
                    reason: "timeout".to_string(),
                });
            }
            Ok(vec![0xff, 0xfb, 0x90, 0x00])
        }
    }

    struct MockTransport {
        fail: bool,
        sends: AtomicUsize,
    }

    impl MockTransport {
        fn working() -> Self {
            Self {
                fail: false,
                sends: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                sends: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ReplyTransport for MockTransport {
        async fn send_audio_reply(
            &self,
            _to: &str,
            _subject: &str,
            _audio: &[u8],
        ) -> Result<(), DispatchError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(DispatchError::Transport("550 rejected".to_string()));
            }
            Ok(())
        }
    }

    // ── Fixtures ────────────────────────────────────────────────────

    fn plain_message(subject: &str, body: &str) -> InboundEmail {
        let raw = format!(
            "From: alice@example.com\r\nSubject: {subject}\r\n\
             Content-Type: text/plain; charset=utf-8\r\n\r\n{body}\r\n"
        );
        InboundEmail {
            uid: 7,
            sender: "alice@example.com".to_string(),
            subject: subject.to_string(),
            raw: raw.into_bytes(),
            received_at: None,
        }
    }

    struct Harness {
        mailbox: Arc<MockMailbox>,
        oracle: Arc<MockOracle>,
        synthesizer: Arc<MockSynthesizer>,
        transport: Arc<MockTransport>,
        processor: MessageProcessor,
    }

    fn harness(policy: ModerationPolicy) -> Harness {
        harness_with(
            policy,
            MockMailbox::new(),
            MockOracle::allowing(),
            MockSynthesizer::working(),
            MockTransport::working(),
        )
    }

    fn harness_with(
        policy: ModerationPolicy,
        mailbox: MockMailbox,
        oracle: MockOracle,
        synthesizer: MockSynthesizer,
        transport: MockTransport,
    ) -> Harness {
        let mailbox = Arc::new(mailbox);
        let oracle = Arc::new(oracle);
        let synthesizer = Arc::new(synthesizer);
        let transport = Arc::new(transport);
        let processor = MessageProcessor::new(
            mailbox.clone(),
            ModerationGate::new(policy, oracle.clone()),
            synthesizer.clone(),
            transport.clone(),
            2000,
        );
        Harness {
            mailbox,
            oracle,
            synthesizer,
            transport,
            processor,
        }
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn happy_path_sends_and_marks_read() {
        let h = harness(ModerationPolicy::default());
        let outcome = h.processor.process(&plain_message("TTS nova", "Hello world")).await;

        assert_eq!(outcome, ProcessingOutcome::Sent { voice: Voice::Nova });
        assert_eq!(h.oracle.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.synthesizer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            *h.synthesizer.last_voice.lock().unwrap(),
            Some(Voice::Nova)
        );
        assert_eq!(h.transport.sends.load(Ordering::SeqCst), 1);
        assert_eq!(h.mailbox.marked.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn voiceless_subject_uses_onyx() {
        let h = harness(ModerationPolicy::default());
        let outcome = h.processor.process(&plain_message("TTS", "Hello")).await;
        assert_eq!(outcome, ProcessingOutcome::Sent { voice: Voice::Onyx });
    }

    #[tokio::test]
    async fn oversized_body_skips_before_any_oracle_call() {
        let h = harness(ModerationPolicy::default());
        let long_body = "x".repeat(2001);
        let outcome = h.processor.process(&plain_message("TTS", &long_body)).await;

        assert_eq!(outcome, ProcessingOutcome::SkippedTooLong { chars: 2001 });
        assert_eq!(h.oracle.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.synthesizer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.mailbox.marked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn length_gate_counts_chars_not_bytes() {
        // 2000 two-byte chars: 4000 bytes but exactly at the char limit
        let h = harness(ModerationPolicy::default());
        let body = "é".repeat(2000);
        let outcome = h.processor.process(&plain_message("TTS", &body)).await;
        assert!(outcome.is_sent(), "got {outcome:?}");
    }

    #[tokio::test]
    async fn flagged_content_never_reaches_synthesis() {
        let h = harness_with(
            ModerationPolicy::default(),
            MockMailbox::new(),
            MockOracle::flagging(),
            MockSynthesizer::working(),
            MockTransport::working(),
        );
        let outcome = h.processor.process(&plain_message("TTS", "vile text")).await;

        assert_eq!(outcome, ProcessingOutcome::SkippedUnsafe);
        assert_eq!(h.synthesizer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.transport.sends.load(Ordering::SeqCst), 0);
        assert_eq!(h.mailbox.marked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn oracle_failure_fails_closed() {
        let mailbox = Arc::new(MockMailbox::new());
        let synthesizer = Arc::new(MockSynthesizer::working());
        let processor = MessageProcessor::new(
            mailbox.clone(),
            ModerationGate::new(ModerationPolicy::default(), Arc::new(FailingOracle)),
            synthesizer.clone(),
            Arc::new(MockTransport::working()),
            2000,
        );

        let outcome = processor.process(&plain_message("TTS", "Hello")).await;
        assert_eq!(outcome, ProcessingOutcome::SkippedUnsafe);
        assert_eq!(synthesizer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(mailbox.marked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn opt_out_token_skips_the_oracle_when_not_forced() {
        let h = harness_with(
            ModerationPolicy {
                force: false,
                disabled: false,
            },
            MockMailbox::new(),
            // would reject if consulted
            MockOracle::flagging(),
            MockSynthesizer::working(),
            MockTransport::working(),
        );
        let outcome = h
            .processor
            .process(&plain_message("TTS NO_MODERATION", "flaggable text"))
            .await;

        assert!(outcome.is_sent());
        assert_eq!(h.oracle.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn html_only_message_is_skipped_no_body() {
        let h = harness(ModerationPolicy::default());
        let raw = b"From: alice@example.com\r\nSubject: TTS\r\n\
            MIME-Version: 1.0\r\n\
            Content-Type: multipart/alternative; boundary=\"b\"\r\n\r\n\
            --b\r\nContent-Type: text/html\r\n\r\n<p>hi</p>\r\n--b--\r\n";
        let message = InboundEmail {
            uid: 9,
            sender: "alice@example.com".to_string(),
            subject: "TTS".to_string(),
            raw: raw.to_vec(),
            received_at: None,
        };

        let outcome = h.processor.process(&message).await;
        assert_eq!(outcome, ProcessingOutcome::SkippedNoBody);
        assert_eq!(h.oracle.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.mailbox.marked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unparseable_payload_is_failed_extraction() {
        let h = harness(ModerationPolicy::default());
        let message = InboundEmail {
            uid: 3,
            sender: "alice@example.com".to_string(),
            subject: "TTS".to_string(),
            raw: Vec::new(),
            received_at: None,
        };

        let outcome = h.processor.process(&message).await;
        assert_eq!(outcome, ProcessingOutcome::FailedExtraction);
        assert_eq!(h.mailbox.marked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn synthesis_failure_leaves_message_unread() {
        let h = harness_with(
            ModerationPolicy::default(),
            MockMailbox::new(),
            MockOracle::allowing(),
            MockSynthesizer::failing(),
            MockTransport::working(),
        );
        let outcome = h.processor.process(&plain_message("TTS", "Hello")).await;

        assert_eq!(outcome, ProcessingOutcome::FailedSynthesis);
        assert_eq!(h.transport.sends.load(Ordering::SeqCst), 0);
        assert_eq!(h.mailbox.marked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn send_failure_leaves_message_unread() {
        let h = harness_with(
            ModerationPolicy::default(),
            MockMailbox::new(),
            MockOracle::allowing(),
            MockSynthesizer::working(),
            MockTransport::failing(),
        );
        let outcome = h.processor.process(&plain_message("TTS", "Hello")).await;

        assert_eq!(outcome, ProcessingOutcome::FailedSend);
        assert_eq!(h.mailbox.marked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_ack_after_send_keeps_sent_outcome() {
        let h = harness_with(
            ModerationPolicy::default(),
            MockMailbox::failing_mark(),
            MockOracle::allowing(),
            MockSynthesizer::working(),
            MockTransport::working(),
        );
        let outcome = h.processor.process(&plain_message("TTS", "Hello")).await;

        // sent, but unread: the next cycle may legitimately resend
        assert!(outcome.is_sent());
        assert_eq!(h.transport.sends.load(Ordering::SeqCst), 1);
        assert_eq!(h.mailbox.marked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn disabled_moderation_sends_without_oracle() {
        let h = harness_with(
            ModerationPolicy {
                force: true,
                disabled: true,
            },
            MockMailbox::new(),
            MockOracle::flagging(),
            MockSynthesizer::working(),
            MockTransport::working(),
        );
        let outcome = h.processor.process(&plain_message("TTS", "anything")).await;

        assert!(outcome.is_sent());
        assert_eq!(h.oracle.calls.load(Ordering::SeqCst), 0);
    }
}
