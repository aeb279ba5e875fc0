//! Plain-text body extraction from the raw message payload.

use mail_parser::{MessageParser, PartType};

use crate::error::ExtractionError;

/// First plain-text part of the message, in original part order, decoded.
///
/// `Ok(None)` is structural absence (the message parsed but has no
/// plain-text part — HTML-only mail lands here); `Err` means the payload
/// would not parse at all. Single-part plain messages come back as their
/// whole decoded body.
pub fn plain_text_body(raw: &[u8]) -> Result<Option<String>, ExtractionError> {
    if raw.is_empty() {
        return Err(ExtractionError::Unparseable);
    }
    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or(ExtractionError::Unparseable)?;

    for part in &parsed.parts {
        if let PartType::Text(text) = &part.body {
            return Ok(Some(text.to_string()));
        }
    }
    Ok(None)
}
