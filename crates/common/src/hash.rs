// Content fingerprints for optimistic concurrency and change detection.
//
// A fingerprint is the lowercase hex SHA-256 of the exact logical bytes that
// end up on disk (after any transport decoding). Two callers that agree on the
// bytes always agree on the fingerprint.

use std::fmt;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of a file's logical content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentFingerprint(String);

impl ContentFingerprint {
    /// Wrap a digest received from a caller (e.g. an `orig_hash` form field).
    ///
    /// The value is compared verbatim, so a malformed digest simply never matches.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ContentFingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Compute the fingerprint of the given bytes.
pub fn fingerprint(content: &[u8]) -> ContentFingerprint {
    ContentFingerprint(sha256_hex(content))
}

/// Compute the fingerprint of a file on disk.
pub fn fingerprint_file(path: &Path) -> io::Result<ContentFingerprint> {
    let content = std::fs::read(path)?;
    Ok(fingerprint(&content))
}

/// Fingerprint of the file at `path`, or `None` when it does not exist.
pub fn fingerprint_file_if_exists(path: &Path) -> io::Result<Option<ContentFingerprint>> {
    match std::fs::read(path) {
        Ok(content) => Ok(Some(fingerprint(&content))),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error),
    }
}

/// Compute the SHA-256 hash of the given bytes, returned as a lowercase hex string.
pub fn sha256_hex(content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut s = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        s.push(HEX[(b >> 4) as usize] as char);
        s.push(HEX[(b & 0x0f) as usize] as char);
    }
    s
}
