//! Mailbox abstraction — search-and-fetch of unread messages plus the
//! read-flag acknowledgment. The concrete implementation speaks IMAP; the
//! trait seam keeps the pipeline testable without a mail server.

pub mod imap;

pub use imap::ImapMailbox;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::MailboxError;

/// One unread message pulled by the cycle scan.
///
/// Carries the full raw payload; body extraction is a pipeline stage of its
/// own, so only the headers needed for addressing and logging are parsed at
/// fetch time.
#[derive(Debug, Clone)]
pub struct InboundEmail {
    /// Mailbox-assigned UID, opaque to the pipeline. Stable across
    /// connections, so the acknowledgment can run on its own session.
    pub uid: u32,
    /// Sender address the reply goes back to.
    pub sender: String,
    /// Subject line (empty string when the header is missing).
    pub subject: String,
    /// Raw RFC822 payload.
    pub raw: Vec<u8>,
    /// Parsed Date header, when present.
    pub received_at: Option<DateTime<Utc>>,
}

/// Search-and-fetch capability the poll loop and orchestrator depend on.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Scan for unread messages whose subject matches the configured token,
    /// in the order the mailbox search returns them. One scoped connection
    /// per call, released on every exit path.
    async fn fetch_unread(&self) -> Result<Vec<InboundEmail>, MailboxError>;

    /// Flip one message read. Called only after that message's reply was
    /// accepted by the outbound transport; never before.
    async fn mark_read(&self, uid: u32) -> Result<(), MailboxError>;
}
