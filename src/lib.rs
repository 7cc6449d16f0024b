//! # ecfg
//!
//! Manage encrypted secrets committed alongside plaintext config, in JSON,
//! YAML, or TOML.
//!
//! A document carries its own recipient public key under `_public_key`.
//! Every other string scalar in the document is replaced by its
//! [`BoxedMessage`] wire form — an ephemeral-sender, NaCl-style public-key
//! box — in place, leaving document structure, key order, comments, and
//! non-secret scalars untouched. Keys (and array elements) whose name
//! starts with `_` are left as plaintext annotations.
//!
//! ## Quick start
//!
//! ```no_run
//! use ecfg::orchestrator::{self, FileType};
//! use std::path::Path;
//!
//! orchestrator::encrypt_file_in_place(Path::new("secrets.json"), FileType::Json)?;
//! # Ok::<(), ecfg::error::EcfgError>(())
//! ```
//!
//! ## What's NOT provided
//!
//! - Key rotation or revocation
//! - Multi-recipient documents
//! - Binary/non-UTF8 document formats
//! - A daemon or long-running service mode

pub mod boxed_message;
pub mod error;
pub mod format;
pub mod keypair;
pub mod keys;
pub mod orchestrator;
pub mod pipeline;

pub use boxed_message::BoxedMessage;
pub use error::{EcfgError, Result};
pub use keypair::{Decrypter, Encrypter, Keypair};
pub use orchestrator::FileType;
