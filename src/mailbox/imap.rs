//! Raw IMAP4rev1 client over TLS (rustls), blocking, run via
//! `spawn_blocking`.
//!
//! Deliberately small: tagged LOGIN/SELECT/UID SEARCH/UID FETCH/UID STORE/
//! LOGOUT is all the pipeline needs. Every public operation opens its own
//! connection and logs out on every exit path, so a failed scan never leaks
//! a session.
//!
//! Messages are addressed by UID throughout, never by sequence number:
//! the read-flag acknowledgment runs on a different connection than the
//! scan, and sequence numbers renumber under concurrent EXPUNGE. A STORE
//! by stale sequence number would flag an unrelated message \Seen and drop
//! it from every future scan.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mail_parser::MessageParser;

use crate::config::MailConfig;
use crate::error::MailboxError;
use crate::mailbox::{InboundEmail, Mailbox};

const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// IMAP-backed mailbox. Cheap to clone the config; connections are
/// per-operation.
pub struct ImapMailbox {
    config: MailConfig,
}

impl ImapMailbox {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Mailbox for ImapMailbox {
    async fn fetch_unread(&self) -> Result<Vec<InboundEmail>, MailboxError> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || fetch_unread_blocking(&config))
            .await
            .map_err(|e| MailboxError::TaskJoin(e.to_string()))?
    }

    async fn mark_read(&self, uid: u32) -> Result<(), MailboxError> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || mark_read_blocking(&config, uid))
            .await
            .map_err(|e| MailboxError::TaskJoin(e.to_string()))?
    }
}

/// One scan: search unread matching the subject token, fetch each hit in
/// search order, log out. Blocking.
fn fetch_unread_blocking(config: &MailConfig) -> Result<Vec<InboundEmail>, MailboxError> {
    let mut session = ImapSession::connect(config)?;
    let result = scan_unread(&mut session, config);
    session.logout();
    result
}

fn scan_unread(
    session: &mut ImapSession,
    config: &MailConfig,
) -> Result<Vec<InboundEmail>, MailboxError> {
    session.login(&config.username, &config.password)?;
    session.select_inbox()?;

    let uids = session.search_unread(&config.subject_token)?;
    tracing::debug!(matches = uids.len(), "mailbox scan complete");

    let mut messages = Vec::with_capacity(uids.len());
    for uid in uids {
        let raw = session.fetch_raw(uid)?;
        let (sender, subject, received_at) = parse_envelope(&raw);
        messages.push(InboundEmail {
            uid,
            sender,
            subject,
            raw,
            received_at,
        });
    }
    Ok(messages)
}

/// Flag a single message `\Seen`. Blocking; own connection.
fn mark_read_blocking(config: &MailConfig, uid: u32) -> Result<(), MailboxError> {
    let mut session = ImapSession::connect(config)?;
    let result = (|| {
        session.login(&config.username, &config.password)?;
        session.select_inbox()?;
        session.store_seen(uid)
    })();
    session.logout();
    result
}

// ── Session ─────────────────────────────────────────────────────────

struct ImapSession {
    tls: rustls::StreamOwned<rustls::ClientConnection, TcpStream>,
    tag: u32,
}

impl ImapSession {
    /// TCP + TLS handshake + server greeting.
    fn connect(config: &MailConfig) -> Result<Self, MailboxError> {
        let tcp = TcpStream::connect((&*config.imap_host, config.imap_port)).map_err(|e| {
            MailboxError::Connect {
                host: config.imap_host.clone(),
                reason: e.to_string(),
            }
        })?;
        tcp.set_read_timeout(Some(READ_TIMEOUT))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = rustls::pki_types::ServerName::try_from(config.imap_host.clone())
            .map_err(|e| MailboxError::Tls(e.to_string()))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| MailboxError::Tls(e.to_string()))?;
        let tls = rustls::StreamOwned::new(conn, tcp);

        let mut session = Self { tls, tag: 0 };
        let _greeting = session.read_line()?;
        Ok(session)
    }

    fn login(&mut self, username: &str, password: &str) -> Result<(), MailboxError> {
        let lines = self.command(&format!("LOGIN {} {}", quote(username), quote(password)))?;
        if !last_is_ok(&lines) {
            return Err(MailboxError::Auth(last_line(&lines)));
        }
        Ok(())
    }

    fn select_inbox(&mut self) -> Result<(), MailboxError> {
        let lines = self.command("SELECT \"INBOX\"")?;
        if !last_is_ok(&lines) {
            return Err(MailboxError::Protocol(format!(
                "SELECT rejected: {}",
                last_line(&lines)
            )));
        }
        Ok(())
    }

    /// UIDs of unread messages whose subject contains `token`, in the order
    /// the server returned them.
    fn search_unread(&mut self, token: &str) -> Result<Vec<u32>, MailboxError> {
        let lines = self.command(&uid_search_command(token))?;
        if !last_is_ok(&lines) {
            return Err(MailboxError::Protocol(format!(
                "UID SEARCH rejected: {}",
                last_line(&lines)
            )));
        }
        Ok(parse_search_ids(&lines))
    }

    /// Full RFC822 payload of one message. Reads the byte count from the
    /// FETCH literal instead of re-joining response lines, so message bodies
    /// pass through unmangled.
    fn fetch_raw(&mut self, uid: u32) -> Result<Vec<u8>, MailboxError> {
        let tag = self.next_tag();
        self.write_line(&format!("{tag} {}", uid_fetch_command(uid)))?;

        let mut raw: Option<Vec<u8>> = None;
        loop {
            let line = self.read_line()?;
            if line.starts_with(&format!("{tag} ")) {
                if !is_ok_line(&line) {
                    return Err(MailboxError::Protocol(format!(
                        "UID FETCH {uid} rejected: {}",
                        line.trim()
                    )));
                }
                break;
            }
            if line.starts_with('*')
                && let Some(len) = parse_literal_len(&line)
            {
                raw = Some(self.read_exact(len)?);
            }
        }

        raw.ok_or_else(|| {
            MailboxError::Protocol(format!("UID FETCH {uid} returned no message body"))
        })
    }

    fn store_seen(&mut self, uid: u32) -> Result<(), MailboxError> {
        let lines = self.command(&uid_store_seen_command(uid))?;
        if !last_is_ok(&lines) {
            return Err(MailboxError::Protocol(format!(
                "UID STORE {uid} rejected: {}",
                last_line(&lines)
            )));
        }
        Ok(())
    }

    /// Best-effort; a failed logout is not worth failing the operation over.
    fn logout(&mut self) {
        if let Err(e) = self.command("LOGOUT") {
            tracing::debug!("IMAP logout failed: {e}");
        }
    }

    /// Send one tagged command and collect response lines up to and
    /// including the tagged completion line.
    fn command(&mut self, cmd: &str) -> Result<Vec<String>, MailboxError> {
        let tag = self.next_tag();
        self.write_line(&format!("{tag} {cmd}"))?;

        let mut lines = Vec::new();
        loop {
            let line = self.read_line()?;
            let done = line.starts_with(&format!("{tag} "));
            lines.push(line);
            if done {
                break;
            }
        }
        Ok(lines)
    }

    fn next_tag(&mut self) -> String {
        self.tag += 1;
        format!("A{}", self.tag)
    }

    fn write_line(&mut self, line: &str) -> Result<(), MailboxError> {
        self.tls.write_all(line.as_bytes())?;
        self.tls.write_all(b"\r\n")?;
        self.tls.flush()?;
        Ok(())
    }

    fn read_line(&mut self) -> Result<String, MailboxError> {
        let mut buf = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            match self.tls.read(&mut byte) {
                Ok(0) => {
                    return Err(MailboxError::Protocol(
                        "connection closed mid-response".to_string(),
                    ));
                }
                Ok(_) => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(String::from_utf8_lossy(&buf).to_string());
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn read_exact(&mut self, len: usize) -> Result<Vec<u8>, MailboxError> {
        let mut buf = vec![0u8; len];
        self.tls.read_exact(&mut buf)?;
        Ok(buf)
    }
}

// ── Command construction (free functions for testability) ───────────

/// All three message-addressing commands use the UID variants. The ack runs
/// on a separate connection from the scan, and only UIDs survive across
/// sessions (sequence numbers renumber on EXPUNGE).
fn uid_search_command(token: &str) -> String {
    format!("UID SEARCH UNSEEN SUBJECT {}", quote(token))
}

fn uid_fetch_command(uid: u32) -> String {
    format!("UID FETCH {uid} (RFC822)")
}

fn uid_store_seen_command(uid: u32) -> String {
    format!("UID STORE {uid} +FLAGS (\\Seen)")
}

// ── Response parsing (free functions for testability) ───────────────

/// UIDs from `* SEARCH n n n` lines, server order preserved.
fn parse_search_ids(lines: &[String]) -> Vec<u32> {
    let mut ids = Vec::new();
    for line in lines {
        if let Some(rest) = line.strip_prefix("* SEARCH") {
            ids.extend(rest.split_whitespace().filter_map(|t| t.parse::<u32>().ok()));
        }
    }
    ids
}

/// Byte count of a trailing IMAP literal, e.g.
/// `* 7 FETCH (UID 457 RFC822 {3042}`.
fn parse_literal_len(line: &str) -> Option<usize> {
    let open = line.rfind('{')?;
    let close = line.rfind('}')?;
    if close < open {
        return None;
    }
    line.get(open + 1..close)?.parse().ok()
}

/// Status word of a tagged response line (`A3 OK ...`).
fn is_ok_line(line: &str) -> bool {
    line.split_whitespace()
        .nth(1)
        .is_some_and(|s| s.eq_ignore_ascii_case("OK"))
}

fn last_is_ok(lines: &[String]) -> bool {
    lines.last().is_some_and(|l| is_ok_line(l))
}

fn last_line(lines: &[String]) -> String {
    lines.last().map(|l| l.trim().to_string()).unwrap_or_default()
}

/// IMAP quoted-string, escaping backslash and double quote.
fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Sender, subject, and Date header from a raw payload. Header parse
/// failures surface downstream as extraction outcomes, so this never errors;
/// it just degrades.
fn parse_envelope(raw: &[u8]) -> (String, String, Option<DateTime<Utc>>) {
    match MessageParser::default().parse(raw) {
        Some(parsed) => {
            let sender = parsed
                .from()
                .and_then(|addr| addr.first())
                .and_then(|a| a.address())
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let subject = parsed.subject().unwrap_or_default().to_string();
            let received_at = parsed
                .date()
                .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0));
            (sender, subject, received_at)
        }
        None => ("unknown".to_string(), String::new(), None),
    }
}

// ── Tests ───────────────────────────────────────────────────────────
