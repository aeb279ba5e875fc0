//! Poll loop — one mailbox scan per cycle, each message through the
//! orchestrator, fixed sleep in between.
//!
//! A cycle that cannot even scan (mailbox unreachable, auth failure) is
//! logged and abandoned; the next cycle reconnects from scratch. There is
//! no circuit breaker. Ctrl-C exits the loop between cycles.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::mailbox::Mailbox;
use crate::pipeline::processor::MessageProcessor;
use crate::pipeline::types::ProcessingOutcome;

/// Per-cycle tally of message outcomes, for the cycle summary log line.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleSummary {
    pub scanned: usize,
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl CycleSummary {
    fn record(&mut self, outcome: &ProcessingOutcome) {
        match outcome {
            ProcessingOutcome::Sent { .. } => self.sent += 1,
            ProcessingOutcome::SkippedTooLong { .. }
            | ProcessingOutcome::SkippedUnsafe
            | ProcessingOutcome::SkippedNoBody => self.skipped += 1,
            ProcessingOutcome::FailedSynthesis
            | ProcessingOutcome::FailedSend
            | ProcessingOutcome::FailedExtraction => self.failed += 1,
        }
    }
}

/// Drives the scan/process/sleep cycle.
pub struct PollLoop {
    mailbox: Arc<dyn Mailbox>,
    processor: MessageProcessor,
    interval: Duration,
}

impl PollLoop {
    pub fn new(mailbox: Arc<dyn Mailbox>, processor: MessageProcessor, interval: Duration) -> Self {
        Self {
            mailbox,
            processor,
            interval,
        }
    }

    /// One scan-and-process pass. Errors here mean the scan itself failed;
    /// per-message failures are contained inside the orchestrator and show
    /// up only in the summary.
    pub async fn run_cycle(&self) -> crate::error::Result<CycleSummary> {
        let messages = self.mailbox.fetch_unread().await?;

        let mut summary = CycleSummary {
            scanned: messages.len(),
            ..Default::default()
        };

        if messages.is_empty() {
            info!("no matching unread messages");
            return Ok(summary);
        }

        for message in &messages {
            let outcome = self.processor.process(message).await;
            info!(
                uid = message.uid,
                sender = %message.sender,
                outcome = outcome.label(),
                "message processed"
            );
            summary.record(&outcome);
        }

        info!(
            scanned = summary.scanned,
            sent = summary.sent,
            skipped = summary.skipped,
            failed = summary.failed,
            "cycle complete"
        );
        Ok(summary)
    }

    /// Single scan, then return. `--loop`-less invocation.
    pub async fn run_once(&self) -> crate::error::Result<CycleSummary> {
        self.run_cycle().await
    }

    /// Scan, sleep, repeat until Ctrl-C. A failed scan is logged and the
    /// loop keeps going; the sleep doubles as the retry backoff.
    pub async fn run_forever(&self) {
        info!(interval_secs = self.interval.as_secs(), "poll loop started");
        loop {
            if let Err(e) = self.run_cycle().await {
                error!("cycle aborted: {e}");
            }

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupt received, shutting down");
                    return;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}
