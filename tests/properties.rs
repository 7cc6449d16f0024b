//! Property-style checks for the invariants in the design notes: round-trip,
//! idempotence, comment preservation, structural preservation, tamper
//! detection, and nonce uniqueness.

use proptest::prelude::*;

use ecfg::boxed_message::BoxedMessage;
use ecfg::keypair::Keypair;
use ecfg::orchestrator::{self, FileType};

fn arb_scalar_word() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ]{1,24}"
}

proptest! {
    /// P1: decrypt(encrypt(D)) recovers every plaintext scalar.
    #[test]
    fn round_trip_recovers_plaintext(password in arb_scalar_word(), token in arb_scalar_word()) {
        let recipient = Keypair::generate();
        let dir = tempfile::tempdir().unwrap();
        ecfg::keys::write_to_keydir(dir.path(), recipient.public, &recipient.private_hex()).unwrap();

        let doc = format!(
            r#"{{"_public_key": "{}", "password": "{password}", "token": "{token}"}}"#,
            recipient.public_hex()
        );

        let encrypted = orchestrator::encrypt_data(doc.as_bytes(), FileType::Json).unwrap();
        let decrypted = orchestrator::decrypt_data(&encrypted, FileType::Json, Some(dir.path().to_str().unwrap())).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&decrypted).unwrap();

        prop_assert_eq!(value["password"].as_str().unwrap(), password);
        prop_assert_eq!(value["token"].as_str().unwrap(), token);
    }

    /// P3: a key beginning with `_` leaves its value's string scalars untouched.
    #[test]
    fn underscore_keys_are_never_transformed(note in arb_scalar_word()) {
        let recipient = Keypair::generate();
        let doc = format!(
            r#"{{"_public_key": "{}", "_note": "{note}"}}"#,
            recipient.public_hex()
        );

        let encrypted = orchestrator::encrypt_data(doc.as_bytes(), FileType::Json).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&encrypted).unwrap();
        prop_assert_eq!(value["_note"].as_str().unwrap(), note);
    }
}

/// P2: re-encrypting an already-boxed document doesn't re-wrap boxed scalars.
#[test]
fn encrypt_is_idempotent_on_already_boxed_scalars() {
    let recipient = Keypair::generate();
    let doc = format!(r#"{{"_public_key": "{}", "a": "b"}}"#, recipient.public_hex());

    let once = orchestrator::encrypt_data(doc.as_bytes(), FileType::Json).unwrap();
    let twice = orchestrator::encrypt_data(&once, FileType::Json).unwrap();
    assert_eq!(once, twice);
}

/// P4: structural preservation — non-transformable bytes are untouched, just
/// shifted by the transformed ranges.
#[test]
fn structural_bytes_survive_a_transform_untouched() {
    let recipient = Keypair::generate();
    let doc = format!(
        r#"{{"_public_key": "{}", "count": 42, "enabled": true, "tag": null, "password": "s3cr3t"}}"#,
        recipient.public_hex()
    );

    let encrypted = orchestrator::encrypt_data(doc.as_bytes(), FileType::Json).unwrap();
    let encrypted_str = String::from_utf8(encrypted).unwrap();
    assert!(encrypted_str.contains("\"count\": 42"));
    assert!(encrypted_str.contains("\"enabled\": true"));
    assert!(encrypted_str.contains("\"tag\": null"));
}

/// P5: tampering with a BoxedMessage's box field fails authentication.
#[test]
fn tampered_ciphertext_fails_authentication() {
    let sender = Keypair::generate();
    let recipient = Keypair::generate();
    let encrypter = sender.encrypter(recipient.public);
    let decrypter = recipient.decrypter();

    let mut boxed = encrypter.encrypt(b"payload").unwrap();
    let last = boxed.len() - 2;
    boxed[last] ^= 0xFF;

    assert!(matches!(decrypter.decrypt(&boxed), Err(ecfg::EcfgError::AuthenticationFailed)));
}

/// P6: nonces don't repeat across many encryptions.
#[test]
fn nonces_are_unique_across_many_encryptions() {
    use std::collections::HashSet;

    let sender = Keypair::generate();
    let recipient = Keypair::generate();
    let encrypter = sender.encrypter(recipient.public);

    let mut seen = HashSet::new();
    for i in 0..10_000u32 {
        let boxed = encrypter.encrypt(format!("msg-{i}").as_bytes()).unwrap();
        let bm = BoxedMessage::load(&boxed).unwrap();
        assert!(seen.insert(bm.nonce), "nonce reused at iteration {i}");
    }
}

/// P7: BoxedMessage wire form round-trips through load/dump.
#[test]
fn boxed_message_wire_form_round_trips() {
    let bm = BoxedMessage {
        schema_version: 1,
        encrypter_public: [42u8; 32],
        nonce: [7u8; 24],
        box_bytes: vec![1, 2, 3, 4, 5],
    };
    let loaded = BoxedMessage::load(bm.dump().as_bytes()).unwrap();
    assert_eq!(loaded, bm);
}
