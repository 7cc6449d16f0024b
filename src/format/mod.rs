//! Shared contract implemented by the JSON, YAML, and TOML handlers.

pub mod json;
pub mod toml;
pub mod yaml;

use std::sync::Arc;

use crate::error::{EcfgError, Result};

/// The top-level key under which the recipient's public key is stored.
pub const PUBLIC_KEY_FIELD: &str = "_public_key";

/// A scalar-value transform, applied to the decoded (unquoted, unescaped)
/// content of every transformable scalar in a document. `'static` and
/// `Arc`-wrapped so handlers can clone it into worker threads for
/// concurrent dispatch rather than running every scalar on the calling
/// thread.
pub type Action = dyn Fn(&[u8]) -> Result<Vec<u8>> + Send + Sync;

/// Every format handler parses its document generically enough to find
/// `_public_key`, and walks its transformable scalar positions in document
/// order, splicing `action`'s output back into the original bytes.
pub trait FormatHandler {
    fn extract_public_key(&self, data: &[u8]) -> Result<[u8; 32]>;
    fn transform_scalar_values(&self, data: &[u8], action: &Arc<Action>) -> Result<Vec<u8>>;
}

/// Hex-decode and length-check a candidate `_public_key` value. Shared by
/// all three handlers once they've located the raw string.
pub(crate) fn decode_public_key(raw: Option<&str>) -> Result<[u8; 32]> {
    let raw = raw.ok_or(EcfgError::PublicKeyMissing)?;
    if raw.len() != 64 {
        return Err(EcfgError::PublicKeyInvalid);
    }
    let bytes = hex::decode(raw).map_err(|_| EcfgError::PublicKeyInvalid)?;
    if bytes.len() != 32 {
        return Err(EcfgError::PublicKeyInvalid);
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}
