// Transport encoding for edit payloads.
//
// Browser editors ship file contents as base64 of the UTF-8 bytes so that
// arbitrary unicode survives form posts. The engine always works on the
// decoded bytes; fingerprints are never computed over the transport form.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How edit contents were encoded by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentEncoding {
    /// Contents are the literal file text.
    #[default]
    Raw,
    /// Contents are base64 of the UTF-8 bytes.
    Base64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("invalid base64 payload: {0}")]
    InvalidBase64(String),
}

/// Encode bytes the way the browser editor does (`b64EncodeUnicode`).
pub fn encode_base64(content: &[u8]) -> String {
    STANDARD.encode(content)
}

/// Decode a base64 payload, ignoring embedded whitespace and line breaks.
pub fn decode_base64(payload: &str) -> Result<Vec<u8>, EncodingError> {
    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|error| EncodingError::InvalidBase64(error.to_string()))
}

/// Turn caller-supplied contents into the bytes that will be written to disk.
pub fn decode_contents(
    encoding: ContentEncoding,
    contents: &str,
) -> Result<Vec<u8>, EncodingError> {
    match encoding {
        ContentEncoding::Raw => Ok(contents.as_bytes().to_vec()),
        ContentEncoding::Base64 => decode_base64(contents),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_preserves_multibyte_text() {
        let text = "Résumé — π ≈ 3.14159 ✓\n";
        let encoded = encode_base64(text.as_bytes());
        let decoded = decode_base64(&encoded).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), text);
    }

    #[test]
    fn decode_ignores_line_breaks() {
        let encoded = encode_base64(b"{\"uuid\": \"abc\"}");
        let wrapped = format!("{}\n{}", &encoded[..8], &encoded[8..]);
        assert_eq!(decode_base64(&wrapped).unwrap(), b"{\"uuid\": \"abc\"}");
    }

    #[test]
    fn decode_rejects_garbage() {
        let error = decode_base64("!!not base64!!").unwrap_err();
        assert!(matches!(error, EncodingError::InvalidBase64(_)));
    }

    #[test]
    fn raw_contents_pass_through() {
        let bytes = decode_contents(ContentEncoding::Raw, "plain text").unwrap();
        assert_eq!(bytes, b"plain text");
    }

    #[test]
    fn base64_contents_are_decoded() {
        let bytes = decode_contents(ContentEncoding::Base64, "aGVsbG8=").unwrap();
        assert_eq!(bytes, b"hello");
    }
}
