//! Unified error type for the core transform pipeline.

use std::fmt;

/// Everything that can go wrong extracting a key, walking a document, or
/// boxing/unboxing a scalar. Recoverable at the call site; never fatal to a
/// process beyond the current invocation.
#[derive(Debug)]
pub enum EcfgError {
    /// The document couldn't be parsed at the structural level required to
    /// walk it (bad JSON/YAML/TOML syntax).
    DocumentMalformed(String),
    /// Top-level `_public_key` field is absent.
    PublicKeyMissing,
    /// `_public_key` is present but not a 64-character hex string decoding
    /// to 32 bytes.
    PublicKeyInvalid,
    /// No directory in the keypath yielded a readable private key file.
    PrivateKeyNotFound,
    /// A private key file was found but its contents were malformed.
    PrivateKeyInvalid,
    /// A scalar under decrypt did not parse as a `BoxedMessage`.
    MalformedCiphertext,
    /// The box failed to open (tamper, or wrong key).
    AuthenticationFailed,
    /// Underlying file I/O failed.
    Io(std::io::Error),
    /// The action passed into `transform_scalar_values` failed.
    ActionFailed(Box<EcfgError>),
}

impl fmt::Display for EcfgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcfgError::DocumentMalformed(detail) => {
                write!(f, "document-malformed: {detail}")
            }
            EcfgError::PublicKeyMissing => {
                write!(f, "public-key-missing: _public_key not present in document")
            }
            EcfgError::PublicKeyInvalid => {
                write!(f, "public-key-invalid: _public_key is not a valid 32-byte hex string")
            }
            EcfgError::PrivateKeyNotFound => {
                write!(f, "private-key-not-found: no keydir held a matching private key")
            }
            EcfgError::PrivateKeyInvalid => {
                write!(f, "private-key-invalid: private key file contents are malformed")
            }
            EcfgError::MalformedCiphertext => {
                write!(f, "malformed-ciphertext: value is not a valid BoxedMessage")
            }
            EcfgError::AuthenticationFailed => {
                write!(f, "authentication-failed: box did not open")
            }
            EcfgError::Io(e) => write!(f, "io-error: {e}"),
            EcfgError::ActionFailed(inner) => write!(f, "action-failed: {inner}"),
        }
    }
}

impl std::error::Error for EcfgError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EcfgError::Io(e) => Some(e),
            EcfgError::ActionFailed(inner) => Some(inner.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for EcfgError {
    fn from(e: std::io::Error) -> Self {
        EcfgError::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, EcfgError>;
