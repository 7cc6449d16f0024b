//! End-to-end scenarios against the public API: generate a keypair, encrypt
//! a document, decrypt it back, and check the scenarios the format handlers
//! are specifically responsible for (suppressed keys, tags, re-quoting).

use std::io::Write;

use ecfg::keypair::Keypair;
use ecfg::keys;
use ecfg::orchestrator::{self, FileType};

fn keydir_with(kp: &Keypair) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    keys::write_to_keydir(dir.path(), kp.public, &kp.private_hex()).unwrap();
    dir
}

#[test]
fn json_document_round_trips_and_preserves_comments_field() {
    let recipient = Keypair::generate();
    let dir = keydir_with(&recipient);

    let doc = format!(
        r#"{{"_public_key": "{}", "_description": "prod secrets", "db_password": "s3cr3t", "nested": {{"api_key": "abc123"}}}}"#,
        recipient.public_hex()
    );

    let encrypted = orchestrator::encrypt_data(doc.as_bytes(), FileType::Json).unwrap();
    let encrypted_str = String::from_utf8(encrypted.clone()).unwrap();
    assert!(encrypted_str.contains("prod secrets"), "underscore-prefixed key must stay plaintext");
    assert!(!encrypted_str.contains("s3cr3t"), "non-underscore value must be boxed");
    assert!(!encrypted_str.contains("abc123"), "nested scalars must be boxed too");

    let decrypted = orchestrator::decrypt_data(&encrypted, FileType::Json, Some(dir.path().to_str().unwrap())).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&decrypted).unwrap();
    assert_eq!(value["db_password"], "s3cr3t");
    assert_eq!(value["nested"]["api_key"], "abc123");
    assert_eq!(value["_description"], "prod secrets");
}

#[test]
fn yaml_document_with_tags_and_comments_round_trips() {
    let recipient = Keypair::generate();
    let dir = keydir_with(&recipient);

    let doc = format!(
        "_public_key: {}\n# top-level comment\npassword: !!str hunter2\n_note: keep me\n",
        recipient.public_hex()
    );

    let encrypted = orchestrator::encrypt_data(doc.as_bytes(), FileType::Yaml).unwrap();
    let encrypted_str = String::from_utf8(encrypted.clone()).unwrap();
    assert!(encrypted_str.contains("# top-level comment"));
    assert!(encrypted_str.contains("keep me"));
    assert!(!encrypted_str.contains("hunter2"));

    let decrypted = orchestrator::decrypt_data(&encrypted, FileType::Yaml, Some(dir.path().to_str().unwrap())).unwrap();
    let decrypted_str = String::from_utf8(decrypted).unwrap();
    assert!(decrypted_str.contains("hunter2"));
}

#[test]
fn toml_document_with_literal_string_round_trips() {
    let recipient = Keypair::generate();
    let dir = keydir_with(&recipient);

    let doc = format!(
        "_public_key = \"{}\"\npath = 'C:\\Windows\\system32'\n_label = \"kept\"\n",
        recipient.public_hex()
    );

    let encrypted = orchestrator::encrypt_data(doc.as_bytes(), FileType::Toml).unwrap();
    let encrypted_str = String::from_utf8(encrypted.clone()).unwrap();
    assert!(encrypted_str.contains("kept"));
    assert!(!encrypted_str.contains("system32"));

    let decrypted = orchestrator::decrypt_data(&encrypted, FileType::Toml, Some(dir.path().to_str().unwrap())).unwrap();
    let decrypted_str = String::from_utf8(decrypted).unwrap();
    assert!(decrypted_str.contains("system32"));
}

#[test]
fn encrypting_a_file_in_place_then_decrypting_recovers_the_original_secrets() {
    let recipient = Keypair::generate();
    let dir = keydir_with(&recipient);

    let doc = format!(r#"{{"_public_key": "{}", "token": "topsecret"}}"#, recipient.public_hex());
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    file.write_all(doc.as_bytes()).unwrap();
    file.flush().unwrap();

    orchestrator::encrypt_file_in_place(file.path(), FileType::Json).unwrap();
    let decrypted = orchestrator::decrypt_file(file.path(), FileType::Json, Some(dir.path().to_str().unwrap())).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&decrypted).unwrap();
    assert_eq!(value["token"], "topsecret");
}

#[test]
fn decrypting_with_the_wrong_keydir_fails_with_private_key_not_found() {
    let recipient = Keypair::generate();
    let doc = format!(r#"{{"_public_key": "{}", "token": "topsecret"}}"#, recipient.public_hex());
    let encrypted = orchestrator::encrypt_data(doc.as_bytes(), FileType::Json).unwrap();

    let empty_dir = tempfile::tempdir().unwrap();
    let err = orchestrator::decrypt_data(&encrypted, FileType::Json, Some(empty_dir.path().to_str().unwrap()))
        .unwrap_err();
    assert!(matches!(err, ecfg::EcfgError::PrivateKeyNotFound));
}

#[test]
fn keygen_written_to_a_keydir_is_usable_for_decryption() {
    let kp = Keypair::generate();
    let dir = tempfile::tempdir().unwrap();
    keys::write_to_keydir(dir.path(), kp.public, &kp.private_hex()).unwrap();

    let doc = format!(r#"{{"_public_key": "{}", "x": "y"}}"#, kp.public_hex());
    let encrypted = orchestrator::encrypt_data(doc.as_bytes(), FileType::Json).unwrap();
    let decrypted = orchestrator::decrypt_data(&encrypted, FileType::Json, Some(dir.path().to_str().unwrap())).unwrap();
    assert!(String::from_utf8(decrypted).unwrap().contains("\"y\""));
}
