use std::hint::black_box;
use std::time::Instant;

use ecfg::keypair::Keypair;
use ecfg::orchestrator::{self, FileType};

fn time_it<F: FnMut()>(label: &str, iters: usize, mut f: F) {
    for _ in 0..(iters / 10).max(10) {
        f();
    }

    let start = Instant::now();
    for _ in 0..iters {
        f();
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / (iters as u32);

    println!("{:<20} total={:?}  per_iter={:?}", label, elapsed, per_iter);
}

fn main() {
    let sender = Keypair::generate();
    let recipient = Keypair::generate();
    let encrypter = sender.encrypter(recipient.public);
    let decrypter = recipient.decrypter();

    let payload = vec![0x42u8; 128];
    let boxed = encrypter.encrypt(&payload).unwrap();

    let iters = 5_000;

    time_it("box_encrypt", iters, || {
        let r = encrypter.encrypt(black_box(&payload));
        black_box(r.ok());
    });

    time_it("box_decrypt", iters, || {
        let r = decrypter.decrypt(black_box(&boxed));
        black_box(r.ok());
    });

    let doc = format!(
        r#"{{"_public_key": "{}", "a": "one", "b": "two", "c": "three", "d": "four", "_note": "skip me", "nested": {{"e": "five", "f": "six"}}}}"#,
        recipient.public_hex()
    );

    time_it("json_encrypt_document", 1_000, || {
        let r = orchestrator::encrypt_data(black_box(doc.as_bytes()), FileType::Json);
        black_box(r.ok());
    });

    let dir = tempfile::tempdir().unwrap();
    ecfg::keys::write_to_keydir(dir.path(), recipient.public, &recipient.private_hex()).unwrap();
    let encrypted_doc = orchestrator::encrypt_data(doc.as_bytes(), FileType::Json).unwrap();

    time_it("json_decrypt_document", 1_000, || {
        let r = orchestrator::decrypt_data(
            black_box(&encrypted_doc),
            FileType::Json,
            Some(dir.path().to_str().unwrap()),
        );
        black_box(r.ok());
    });

    println!("\nDone.");
}
