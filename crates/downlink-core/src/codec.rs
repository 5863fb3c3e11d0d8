//! Envelope codec
//!
//! Turns one transport frame into a typed [`Envelope`]. Decoding never
//! panics; every malformed frame maps to a [`DecodeError`] and the caller
//! decides whether to drop it.

use crate::error::{CoreError, DecodeError};
use crate::types::Envelope;

/// Decode one frame (UTF-8 JSON, text or binary) into an envelope
///
/// # Errors
/// - `DecodeError::Empty` for a zero-length or whitespace-only frame
/// - `DecodeError::Syntax` / `DecodeError::Truncated` for invalid JSON
/// - `DecodeError::Schema` for a missing field, wrong type or unknown enum value
pub fn decode(raw: impl AsRef<[u8]>) -> Result<Envelope, DecodeError> {
    let raw = raw.as_ref();
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Err(DecodeError::Empty);
    }

    let envelope: Envelope = serde_json::from_slice(raw)?;
    tracing::trace!(
        sequence = envelope.sequence_number,
        source = %envelope.source,
        "decoded envelope"
    );
    Ok(envelope)
}

/// Encode an envelope into its JSON wire form
///
/// # Errors
/// Returns `CoreError::Encode` if a float field is not representable
pub fn encode(envelope: &Envelope) -> Result<String, CoreError> {
    serde_json::to_string(envelope).map_err(|e| CoreError::Encode(e.to_string()))
}

/// Pretty-printed variant of [`encode`]
///
/// # Errors
/// Same as [`encode`]
pub fn encode_pretty(envelope: &Envelope) -> Result<String, CoreError> {
    serde_json::to_string_pretty(envelope).map_err(|e| CoreError::Encode(e.to_string()))
}
