//! Message processing pipeline.
//!
//! Every inbound message flows through:
//! 1. `extract::plain_text_body()` — first plain-text MIME part
//! 2. the length gate — oversized bodies never reach an oracle
//! 3. `ModerationGate::screen()` — content safety, fail closed
//! 4. `Voice::from_subject()` — synthesis voice from the subject line
//! 5. `SpeechSynthesizer` → `ReplyTransport` — audio out, reply sent
//!
//! Only a fully sent reply flips the message's read flag.

pub mod extract;
pub mod moderation;
pub mod processor;
pub mod types;
pub mod voice;

pub use moderation::{ModerationDecision, ModerationGate, ModerationPolicy};
pub use processor::MessageProcessor;
pub use types::ProcessingOutcome;
pub use voice::Voice;
