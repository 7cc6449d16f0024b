//! Wire format for one encrypted scalar.
//!
//! ```text
//! EJ[<ver>:<b64 pub>:<b64 nonce>:<b64 box>]
//! ```

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};

use crate::error::{EcfgError, Result};

pub const SCHEMA_VERSION: u32 = 1;
pub const PUBLIC_KEY_BYTES: usize = 32;
pub const NONCE_BYTES: usize = 24;

const WIRE_PREFIX: &str = "EJ[";
const WIRE_SUFFIX: &str = "]";

/// A single encrypted scalar, ready to be spliced back into a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxedMessage {
    pub schema_version: u32,
    pub encrypter_public: [u8; PUBLIC_KEY_BYTES],
    pub nonce: [u8; NONCE_BYTES],
    pub box_bytes: Vec<u8>,
}

impl BoxedMessage {
    /// Produce the wire form. Deterministic.
    pub fn dump(&self) -> String {
        format!(
            "{WIRE_PREFIX}{}:{}:{}:{}{WIRE_SUFFIX}",
            self.schema_version,
            B64.encode(self.encrypter_public),
            B64.encode(self.nonce),
            B64.encode(&self.box_bytes),
        )
    }

    /// Parse the wire form, validating field lengths.
    pub fn load(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| EcfgError::MalformedCiphertext)?;
        let inner = text
            .strip_prefix(WIRE_PREFIX)
            .and_then(|s| s.strip_suffix(WIRE_SUFFIX))
            .ok_or(EcfgError::MalformedCiphertext)?;

        let mut parts = inner.splitn(4, ':');
        let ver = parts.next().ok_or(EcfgError::MalformedCiphertext)?;
        let pub_b64 = parts.next().ok_or(EcfgError::MalformedCiphertext)?;
        let nonce_b64 = parts.next().ok_or(EcfgError::MalformedCiphertext)?;
        let box_b64 = parts.next().ok_or(EcfgError::MalformedCiphertext)?;

        let schema_version: u32 = ver.parse().map_err(|_| EcfgError::MalformedCiphertext)?;

        let pub_bytes = B64.decode(pub_b64).map_err(|_| EcfgError::MalformedCiphertext)?;
        if pub_bytes.len() != PUBLIC_KEY_BYTES {
            return Err(EcfgError::MalformedCiphertext);
        }
        let nonce_bytes = B64.decode(nonce_b64).map_err(|_| EcfgError::MalformedCiphertext)?;
        if nonce_bytes.len() != NONCE_BYTES {
            return Err(EcfgError::MalformedCiphertext);
        }
        let box_bytes = B64.decode(box_b64).map_err(|_| EcfgError::MalformedCiphertext)?;
        if box_bytes.len() < 16 {
            return Err(EcfgError::MalformedCiphertext);
        }

        let mut encrypter_public = [0u8; PUBLIC_KEY_BYTES];
        encrypter_public.copy_from_slice(&pub_bytes);
        let mut nonce = [0u8; NONCE_BYTES];
        nonce.copy_from_slice(&nonce_bytes);

        Ok(BoxedMessage {
            schema_version,
            encrypter_public,
            nonce,
            box_bytes,
        })
    }

    /// Cheap predicate: is this byte sequence already a `BoxedMessage`?
    ///
    /// Matches `^EJ\[\d+:[A-Za-z0-9+/=]{44}:[A-Za-z0-9+/=]{32}:[A-Za-z0-9+/=]+\]$`
    /// without building a regex engine — the grammar is simple enough to
    /// check by hand, and this predicate runs on every scalar in the
    /// document.
    pub fn recognize(data: &[u8]) -> bool {
        let Ok(text) = std::str::from_utf8(data) else {
            return false;
        };
        let Some(inner) = text.strip_prefix(WIRE_PREFIX).and_then(|s| s.strip_suffix(WIRE_SUFFIX)) else {
            return false;
        };

        let mut parts = inner.splitn(4, ':');
        let Some(ver) = parts.next() else { return false };
        let Some(pub_b64) = parts.next() else { return false };
        let Some(nonce_b64) = parts.next() else { return false };
        let Some(box_b64) = parts.next() else { return false };
        if parts.next().is_some() {
            return false;
        }

        if ver.is_empty() || !ver.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        if pub_b64.len() != 44 || !is_b64_alphabet(pub_b64) {
            return false;
        }
        if nonce_b64.len() != 32 || !is_b64_alphabet(nonce_b64) {
            return false;
        }
        if box_b64.is_empty() || !is_b64_alphabet(box_b64) {
            return false;
        }

        true
    }
}

fn is_b64_alphabet(s: &str) -> bool {
    s.bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'='))
}
