//! Key directory resolution and private-key lookup.
//!
//! A private key lives in a file named by the lowercase-hex public key it
//! pairs with, inside one directory of an ordered search list. Grounded on
//! the original tool's `findPrivateKey` (same filename-by-pubkey lookup,
//! same hex + length validation), extended with the XDG/HOME/system search
//! order and the `ECFG_PRIVATE_KEY` env bypass.

use std::env;
use std::path::{Path, PathBuf};

use crate::error::{EcfgError, Result};

pub const ENV_PRIVATE_KEY: &str = "ECFG_PRIVATE_KEY";
pub const ENV_KEYDIR: &str = "ECFG_KEYDIR";
const SYSTEM_KEYDIRS: &[&str] = &["/etc/ecfg/keys", "/opt/ejson/keys"];

/// Where to look for a private key, in order. An explicit `-k`/`--keydir`
/// replaces this with a single-entry list.
pub fn search_path(explicit_keydir: Option<&str>) -> Vec<PathBuf> {
    if let Some(dir) = explicit_keydir {
        return vec![PathBuf::from(dir)];
    }
    if let Ok(dir) = env::var(ENV_KEYDIR) {
        return vec![PathBuf::from(dir)];
    }

    let mut dirs = Vec::new();
    if !running_as_root() {
        if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
            if !xdg.is_empty() {
                dirs.push(Path::new(&xdg).join("ecfg/keys"));
            }
        }
        if let Ok(home) = env::var("HOME") {
            if !home.is_empty() {
                dirs.push(Path::new(&home).join(".ecfg/keys"));
            }
        }
    }
    dirs.extend(SYSTEM_KEYDIRS.iter().map(PathBuf::from));
    dirs
}

#[cfg(unix)]
fn running_as_root() -> bool {
    // SAFETY: getuid takes no arguments and cannot fail.
    unsafe { libc::getuid() == 0 }
}

#[cfg(not(unix))]
fn running_as_root() -> bool {
    false
}

/// Resolve the private half of a keypair for the given public key.
///
/// `ECFG_PRIVATE_KEY`, if set, bypasses the directory search entirely and
/// is used (and validated) directly.
pub fn find_private_key(public: [u8; 32], explicit_keydir: Option<&str>) -> Result<[u8; 32]> {
    if let Ok(inline) = env::var(ENV_PRIVATE_KEY) {
        return decode_private_key(&inline);
    }

    for dir in search_path(explicit_keydir) {
        let path = dir.join(hex::encode(public));
        match std::fs::read_to_string(&path) {
            Ok(contents) => return decode_private_key(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(EcfgError::Io(e)),
        }
    }
    Err(EcfgError::PrivateKeyNotFound)
}

fn decode_private_key(raw: &str) -> Result<[u8; 32]> {
    let trimmed = raw.trim();
    if trimmed.len() != 64 {
        return Err(EcfgError::PrivateKeyInvalid);
    }
    let bytes = hex::decode(trimmed).map_err(|_| EcfgError::PrivateKeyInvalid)?;
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}

/// Write a freshly generated private key into the keydir under its public
/// key's filename, mode 0440 (owner/group read-only).
#[cfg(unix)]
pub fn write_to_keydir(dir: &Path, public: [u8; 32], private_hex: &str) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::create_dir_all(dir)?;
    let path = dir.join(hex::encode(public));
    std::fs::write(&path, private_hex)?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o440))?;
    Ok(())
}

#[cfg(not(unix))]
pub fn write_to_keydir(dir: &Path, public: [u8; 32], private_hex: &str) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(hex::encode(public));
    std::fs::write(&path, private_hex)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypair::Keypair;

    #[test]
    fn explicit_keydir_overrides_everything_else() {
        let path = search_path(Some("/custom/dir"));
        assert_eq!(path, vec![PathBuf::from("/custom/dir")]);
    }

    #[test]
    fn env_private_key_bypasses_directory_search() {
        let kp = Keypair::generate();
        let expected = hex::decode(kp.private_hex()).unwrap();
        env::set_var(ENV_PRIVATE_KEY, kp.private_hex());
        let found = find_private_key(kp.public, Some("/nonexistent"));
        env::remove_var(ENV_PRIVATE_KEY);
        assert_eq!(found.unwrap().as_slice(), expected.as_slice());
    }

    #[test]
    fn round_trips_through_a_keydir_file() {
        let dir = tempfile::tempdir().unwrap();
        let kp = Keypair::generate();
        let expected = hex::decode(kp.private_hex()).unwrap();
        write_to_keydir(dir.path(), kp.public, &kp.private_hex()).unwrap();

        let found = find_private_key(kp.public, Some(dir.path().to_str().unwrap())).unwrap();
        assert_eq!(found.as_slice(), expected.as_slice());
    }

    #[test]
    fn missing_key_file_is_reported_as_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing_public = [7u8; 32];
        match find_private_key(missing_public, Some(dir.path().to_str().unwrap())) {
            Err(EcfgError::PrivateKeyNotFound) => {}
            other => panic!("expected PrivateKeyNotFound, got {other:?}"),
        }
    }

    #[test]
    fn malformed_key_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let public = [9u8; 32];
        std::fs::write(dir.path().join(hex::encode(public)), "not-hex").unwrap();
        match find_private_key(public, Some(dir.path().to_str().unwrap())) {
            Err(EcfgError::PrivateKeyInvalid) => {}
            other => panic!("expected PrivateKeyInvalid, got {other:?}"),
        }
    }
}
