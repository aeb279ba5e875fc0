//! Error types for the TTS mail pipeline.

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mailbox (IMAP) errors. Any of these aborts the current cycle; the next
/// cycle reconnects from scratch.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Failed to connect to {host}: {reason}")]
    Connect { host: String, reason: String },

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("Mailbox authentication failed: {0}")]
    Auth(String),

    #[error("Unexpected IMAP response: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Mailbox task failed: {0}")]
    TaskJoin(String),
}

/// Raised when a fetched message cannot be parsed at all. A parseable
/// message with no plain-text part is not an error (see the extractor).
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Message could not be parsed as MIME")]
    Unparseable,
}

/// Errors from the moderation and speech oracles.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("{endpoint} request failed: {reason}")]
    Request { endpoint: String, reason: String },

    #[error("{endpoint} returned {status}: {message}")]
    Api {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("{endpoint} rate limited")]
    RateLimited { endpoint: String },

    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },
}

/// Outbound (SMTP) errors.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to compose reply: {0}")]
    Compose(String),

    #[error("SMTP send failed: {0}")]
    Transport(String),

    #[error("Dispatch task failed: {0}")]
    TaskJoin(String),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
