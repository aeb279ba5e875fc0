use std::sync::Arc;
use std::time::Duration;

use tts_mailer::config::AppConfig;
use tts_mailer::dispatch::SmtpDispatcher;
use tts_mailer::mailbox::ImapMailbox;
use tts_mailer::openai::OpenAiClient;
use tts_mailer::pipeline::{MessageProcessor, ModerationGate};
use tts_mailer::poller::PollLoop;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  required: EMAIL_IMAP_HOST, EMAIL_SMTP_HOST, EMAIL_USERNAME,");
        eprintln!("            EMAIL_PASSWORD, OPENAI_API_KEY");
        std::process::exit(1);
    });

    let loop_mode = std::env::args().any(|arg| arg == "--loop");

    eprintln!("📧 TTS Mailer v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Account: {}", config.mail.username);
    eprintln!(
        "   IMAP: {}:{}  SMTP: {}:{}",
        config.mail.imap_host, config.mail.imap_port, config.mail.smtp_host, config.mail.smtp_port
    );
    eprintln!("   Subject filter: \"{}\"", config.mail.subject_token);
    eprintln!(
        "   Moderation: {}",
        if config.moderation.disabled {
            "disabled"
        } else if config.moderation.force {
            "forced"
        } else {
            "subject opt-out allowed"
        }
    );
    eprintln!(
        "   Mode: {}\n",
        if loop_mode {
            "continuous loop"
        } else {
            "single scan"
        }
    );

    let mailbox = Arc::new(ImapMailbox::new(config.mail.clone()));
    let oracle = Arc::new(OpenAiClient::new(config.oracle.clone())?);

    let processor = MessageProcessor::new(
        mailbox.clone(),
        ModerationGate::new(config.moderation, oracle.clone()),
        oracle,
        Arc::new(SmtpDispatcher::new(config.mail.clone())),
        config.max_body_chars,
    );

    let poller = PollLoop::new(
        mailbox,
        processor,
        Duration::from_secs(config.poll_interval_secs),
    );

    if loop_mode {
        poller.run_forever().await;
    } else {
        poller.run_once().await?;
    }

    Ok(())
}
