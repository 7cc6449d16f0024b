//! Ties the format handlers, keypair, and key directory together into the
//! operations the CLI calls: encrypt/decrypt a file in place, or a buffer.
//!
//! Grounded on the original tool's top-level `ecfg` package (`EncryptFileInPlace`,
//! `DecryptFile`, `EncryptData`, `DecryptData`): extract the public key, build
//! an encrypter or decrypter, and hand it to the format handler's scalar
//! transform as the `action`.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::error::{EcfgError, Result};
use crate::format::toml::Toml;
use crate::format::yaml::Yaml;
use crate::format::{json::Json, Action, FormatHandler};
use crate::keypair::Keypair;
use crate::keys;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Json,
    Yaml,
    Toml,
}

impl FileType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "json" => Some(FileType::Json),
            "yaml" => Some(FileType::Yaml),
            "toml" => Some(FileType::Toml),
            _ => None,
        }
    }

    /// Infer from a file's suffix. `.yml` is accepted alongside `.yaml`.
    pub fn infer(path: &str) -> Option<Self> {
        if path.ends_with(".json") {
            Some(FileType::Json)
        } else if path.ends_with(".yaml") || path.ends_with(".yml") {
            Some(FileType::Yaml)
        } else if path.ends_with(".toml") {
            Some(FileType::Toml)
        } else {
            None
        }
    }

    fn handler(self) -> &'static dyn FormatHandler {
        match self {
            FileType::Json => &Json,
            FileType::Yaml => &Yaml,
            FileType::Toml => &Toml,
        }
    }
}

/// Re-encrypt every plaintext scalar in `data` using the public key already
/// embedded in the document. Idempotent: already-boxed scalars pass through
/// unchanged.
pub fn encrypt_data(data: &[u8], file_type: FileType) -> Result<Vec<u8>> {
    let handler = file_type.handler();
    let recipient_public = match handler.extract_public_key(data) {
        Ok(key) => key,
        Err(e) => {
            tracing::warn!(file_type = ?file_type, error = %e, "failed to extract public key");
            return Err(e);
        }
    };

    let ephemeral = Keypair::generate();
    let encrypter = Arc::new(ephemeral.encrypter(recipient_public));
    let action: Arc<Action> = Arc::new(move |plaintext: &[u8]| encrypter.encrypt(plaintext));

    let result = handler.transform_scalar_values(data, &action);
    match &result {
        Ok(out) => tracing::info!(file_type = ?file_type, bytes = out.len(), "encrypted document"),
        Err(e) => tracing::warn!(file_type = ?file_type, error = %e, "encrypt failed"),
    }
    result
}

/// Decrypt every boxed scalar in `data`, looking up the matching private
/// key in the key directory (or `ECFG_PRIVATE_KEY`).
pub fn decrypt_data(data: &[u8], file_type: FileType, explicit_keydir: Option<&str>) -> Result<Vec<u8>> {
    let handler = file_type.handler();
    let public = handler.extract_public_key(data)?;
    let private = match keys::find_private_key(public, explicit_keydir) {
        Ok(k) => k,
        Err(e) => {
            tracing::warn!(public_key = %hex::encode(public), error = %e, "private key lookup failed");
            return Err(e);
        }
    };

    let recipient = Keypair::from_parts(public, private);
    let decrypter = Arc::new(recipient.decrypter());
    let action: Arc<Action> = Arc::new(move |ciphertext: &[u8]| decrypter.decrypt(ciphertext));

    let result = handler.transform_scalar_values(data, &action);
    if let Err(e) = &result {
        tracing::warn!(public_key = %hex::encode(public), error = %e, "decrypt failed");
    }
    result
}

/// Encrypt a file in place, preserving its permission bits. Returns the
/// number of bytes written.
pub fn encrypt_file_in_place(path: &Path, file_type: FileType) -> Result<usize> {
    tracing::info!(path = %path.display(), "encrypting file in place");
    let data = fs::read(path)?;
    let mode = fs::metadata(path)?.permissions();

    let newdata = encrypt_data(&data, file_type)?;

    fs::write(path, &newdata)?;
    fs::set_permissions(path, mode)?;
    Ok(newdata.len())
}

/// Decrypt a file, returning its plaintext bytes.
pub fn decrypt_file(path: &Path, file_type: FileType, explicit_keydir: Option<&str>) -> Result<Vec<u8>> {
    let data = fs::read(path).map_err(EcfgError::Io)?;
    decrypt_data(&data, file_type, explicit_keydir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fixture_json(pubkey_hex: &str) -> String {
        format!(
            r#"{{"_public_key": "{pubkey_hex}", "password": "hunter2", "_note": "keep as is", "nested": {{"token": "abc"}}}}"#
        )
    }

    #[test]
    fn encrypt_then_decrypt_round_trips_a_json_document() {
        let recipient = Keypair::generate();
        let dir = tempfile::tempdir().unwrap();
        keys::write_to_keydir(dir.path(), recipient.public, &recipient.private_hex()).unwrap();

        let doc = fixture_json(&recipient.public_hex());
        let encrypted = encrypt_data(doc.as_bytes(), FileType::Json).unwrap();
        assert!(encrypted.windows(3).any(|w| w == b"EJ["));

        let decrypted = decrypt_data(&encrypted, FileType::Json, Some(dir.path().to_str().unwrap())).unwrap();
        let decrypted: serde_json::Value = serde_json::from_slice(&decrypted).unwrap();
        assert_eq!(decrypted["password"], "hunter2");
        assert_eq!(decrypted["_note"], "keep as is");
        assert_eq!(decrypted["nested"]["token"], "abc");
    }

    #[test]
    fn re_encrypting_an_already_encrypted_document_is_idempotent() {
        let recipient = Keypair::generate();
        let doc = fixture_json(&recipient.public_hex());

        let once = encrypt_data(doc.as_bytes(), FileType::Json).unwrap();
        let twice = encrypt_data(&once, FileType::Json).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn encrypt_file_in_place_preserves_permissions() {
        let recipient = Keypair::generate();
        let doc = fixture_json(&recipient.public_hex());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(doc.as_bytes()).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o600)).unwrap();
        }

        encrypt_file_in_place(file.path(), FileType::Json).unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(file.path()).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
        }
    }

    #[test]
    fn decrypt_without_a_matching_private_key_fails() {
        let recipient = Keypair::generate();
        let doc = fixture_json(&recipient.public_hex());
        let encrypted = encrypt_data(doc.as_bytes(), FileType::Json).unwrap();

        let dir = tempfile::tempdir().unwrap();
        match decrypt_data(&encrypted, FileType::Json, Some(dir.path().to_str().unwrap())) {
            Err(EcfgError::PrivateKeyNotFound) => {}
            other => panic!("expected PrivateKeyNotFound, got {other:?}"),
        }
    }

    #[test]
    fn file_type_is_inferred_from_suffix() {
        assert_eq!(FileType::infer("secrets.json"), Some(FileType::Json));
        assert_eq!(FileType::infer("secrets.yaml"), Some(FileType::Yaml));
        assert_eq!(FileType::infer("secrets.yml"), Some(FileType::Yaml));
        assert_eq!(FileType::infer("secrets.toml"), Some(FileType::Toml));
        assert_eq!(FileType::infer("secrets.txt"), None);
    }
}
