//! Keypair generation and the authenticated public-key box used to wrap and
//! unwrap individual scalar payloads.
//!
//! The box itself is NaCl's `crypto_box`: X25519 Diffie-Hellman feeding an
//! XSalsa20Poly1305 AEAD, via the `crypto_box` crate (the same primitive
//! libsodium and the original ecfg tool use).

use crypto_box::aead::{Aead, AeadCore, OsRng};
use crypto_box::{PublicKey, SalsaBox, SecretKey};
use zeroize::Zeroize;

use crate::boxed_message::{BoxedMessage, NONCE_BYTES, PUBLIC_KEY_BYTES, SCHEMA_VERSION};
use crate::error::{EcfgError, Result};

/// A public/private keypair. Fresh for every encryption of every document
/// (the ephemeral sender); loaded from storage for decryption.
pub struct Keypair {
    pub public: [u8; PUBLIC_KEY_BYTES],
    private: [u8; PUBLIC_KEY_BYTES],
}

impl Drop for Keypair {
    fn drop(&mut self) {
        self.private.zeroize();
    }
}

impl Keypair {
    /// Draw 32 random bytes as the private scalar, derive the public key via
    /// Curve25519 base-point multiplication.
    pub fn generate() -> Self {
        let secret = SecretKey::generate(&mut OsRng);
        let public = secret.public_key();
        Keypair {
            public: *public.as_bytes(),
            private: secret.to_bytes(),
        }
    }

    /// Load a keypair whose public half is already known (e.g. from the
    /// document) and whose private half was read from a keydir file.
    pub fn from_parts(public: [u8; PUBLIC_KEY_BYTES], private: [u8; PUBLIC_KEY_BYTES]) -> Self {
        Keypair { public, private }
    }

    pub fn public_hex(&self) -> String {
        hex::encode(self.public)
    }

    pub fn private_hex(&self) -> String {
        hex::encode(self.private)
    }

    fn secret_key(&self) -> SecretKey {
        SecretKey::from(self.private)
    }

    /// Build an encrypter keyed by this (ephemeral) keypair and the given
    /// recipient public key.
    pub fn encrypter(&self, recipient_public: [u8; PUBLIC_KEY_BYTES]) -> Encrypter {
        Encrypter {
            sender_public: self.public,
            salsa_box: SalsaBox::new(&PublicKey::from(recipient_public), &self.secret_key()),
        }
    }

    /// Build a decrypter keyed by this keypair (the recipient).
    pub fn decrypter(&self) -> Decrypter {
        Decrypter {
            recipient_secret: self.secret_key(),
        }
    }
}

/// Encrypts plaintext scalars into `BoxedMessage` wire form. Idempotent:
/// re-encrypting an already-boxed value is a no-op.
pub struct Encrypter {
    sender_public: [u8; PUBLIC_KEY_BYTES],
    salsa_box: SalsaBox,
}

impl Encrypter {
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        if BoxedMessage::recognize(plaintext) {
            return Ok(plaintext.to_vec());
        }

        let nonce = SalsaBox::generate_nonce(&mut OsRng);
        let box_bytes = self
            .salsa_box
            .encrypt(&nonce, plaintext)
            .map_err(|_| EcfgError::AuthenticationFailed)?;

        let mut nonce_bytes = [0u8; NONCE_BYTES];
        nonce_bytes.copy_from_slice(nonce.as_slice());

        let bm = BoxedMessage {
            schema_version: SCHEMA_VERSION,
            encrypter_public: self.sender_public,
            nonce: nonce_bytes,
            box_bytes,
        };
        Ok(bm.dump().into_bytes())
    }
}

/// Decrypts `BoxedMessage` wire form back into plaintext scalars.
pub struct Decrypter {
    recipient_secret: SecretKey,
}

impl Decrypter {
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let bm = BoxedMessage::load(ciphertext)?;

        let salsa_box = SalsaBox::new(&PublicKey::from(bm.encrypter_public), &self.recipient_secret);
        let nonce = crypto_box::Nonce::from_slice(&bm.nonce);
        salsa_box
            .decrypt(nonce, bm.box_bytes.as_slice())
            .map_err(|_| EcfgError::AuthenticationFailed)
    }
}
