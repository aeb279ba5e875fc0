//! TTS Mailer — inbound-email text-to-speech pipeline.
//!
//! Scans a mailbox for unread messages matching a subject token, screens
//! their text through a content-safety oracle, synthesizes speech, and
//! replies to the sender with the audio attached.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod mailbox;
pub mod openai;
pub mod pipeline;
pub mod poller;
