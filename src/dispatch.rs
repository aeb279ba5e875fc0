//! Outbound reply dispatch — composes the audio reply and submits it over
//! SMTP with STARTTLS.
//!
//! The reply echoes the original subject verbatim and carries the audio as
//! a fixed-name binary attachment. Processing is sequential, so the fixed
//! filename never collides.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::info;

use crate::config::MailConfig;
use crate::error::DispatchError;
use crate::pipeline::types::ReplyTransport;

pub const ATTACHMENT_FILENAME: &str = "transcribed_audio.mp3";

/// SMTP-backed reply dispatcher. Blocking submission runs on the blocking
/// pool; one transport is built per send.
pub struct SmtpDispatcher {
    config: MailConfig,
}

impl SmtpDispatcher {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ReplyTransport for SmtpDispatcher {
    async fn send_audio_reply(
        &self,
        to: &str,
        subject: &str,
        audio: &[u8],
    ) -> Result<(), DispatchError> {
        let config = self.config.clone();
        let to = to.to_string();
        let subject = subject.to_string();
        let audio = audio.to_vec();
        tokio::task::spawn_blocking(move || send_blocking(&config, &to, &subject, audio))
            .await
            .map_err(|e| DispatchError::TaskJoin(e.to_string()))?
    }
}

fn send_blocking(
    config: &MailConfig,
    to: &str,
    subject: &str,
    audio: Vec<u8>,
) -> Result<(), DispatchError> {
    let email = compose_reply(&config.username, to, subject, audio)?;

    let transport = SmtpTransport::starttls_relay(&config.smtp_host)
        .map_err(|e| DispatchError::Transport(format!("STARTTLS relay init failed: {e}")))?
        .port(config.smtp_port)
        .credentials(Credentials::new(
            config.username.clone(),
            config.password.clone(),
        ))
        .build();

    transport
        .send(&email)
        .map_err(|e| DispatchError::Transport(e.to_string()))?;

    info!(to = %to, "audio reply sent");
    Ok(())
}

/// HTML informational part plus the audio attachment, under one mixed
/// multipart. Subject comes back verbatim, no `Re:` prefix.
fn compose_reply(
    from: &str,
    to: &str,
    subject: &str,
    audio: Vec<u8>,
) -> Result<Message, DispatchError> {
    let from_mailbox = from.parse().map_err(|e| DispatchError::InvalidAddress {
        address: from.to_string(),
        reason: format!("{e}"),
    })?;
    let to_mailbox = to.parse().map_err(|e| DispatchError::InvalidAddress {
        address: to.to_string(),
        reason: format!("{e}"),
    })?;

    let attachment = Attachment::new(ATTACHMENT_FILENAME.to_string()).body(
        audio,
        ContentType::parse("application/octet-stream")
            .map_err(|e| DispatchError::Compose(format!("attachment content type: {e}")))?,
    );

    Message::builder()
        .from(from_mailbox)
        .to(to_mailbox)
        .subject(subject)
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::html(reply_body_html(to)))
                .singlepart(attachment),
        )
        .map_err(|e| DispatchError::Compose(e.to_string()))
}

fn reply_body_html(to: &str) -> String {
    format!(
        "<html><body>\
         <p>Dear {to},</p>\
         <p>Thank you for using the text-to-speech service. \
         Please find the transcribed audio file attached.</p>\
         </body></html>"
    )
}
