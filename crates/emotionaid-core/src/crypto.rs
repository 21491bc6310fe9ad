//! Encryption at rest using ChaCha20-Poly1305 AEAD
//!
//! Every file the store writes is sealed with a single data key that belongs
//! to the current OS user (see [`crate::keys`]).

use crate::error::CompanionError;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;

/// Nonce size for ChaCha20-Poly1305 (12 bytes)
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size appended by the cipher
pub const TAG_SIZE: usize = 16;

/// Seals and opens stored payloads.
///
/// # Wire Format
///
/// `[nonce (12 bytes)] + [ciphertext + auth_tag (16 bytes)]`
///
/// # Example
///
/// ```
/// use emotionaid_core::crypto::DataCipher;
///
/// let cipher = DataCipher::new(&DataCipher::generate_key());
/// let sealed = cipher.seal(b"diary").unwrap();
/// assert_eq!(cipher.open("diary_tags_U1", &sealed).unwrap(), b"diary");
/// ```
pub struct DataCipher {
    cipher: ChaCha20Poly1305,
}

impl DataCipher {
    /// Create a cipher from a 32-byte data key.
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(key.into()),
        }
    }

    /// Generate a new random 32-byte data key.
    pub fn generate_key() -> [u8; 32] {
        let mut key = [0u8; 32];
        rand::rng().fill_bytes(&mut key);
        key
    }

    /// Encrypt `plaintext` under a fresh random nonce.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CompanionError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| CompanionError::Encryption(format!("Encryption failed: {}", e)))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Decrypt a sealed payload.
    ///
    /// `label` names the record in the error. Short input, a wrong key and
    /// tampered bytes all surface as [`CompanionError::CorruptData`].
    pub fn open(&self, label: &str, sealed: &[u8]) -> Result<Vec<u8>, CompanionError> {
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CompanionError::corrupt(label, "data too short to be sealed"));
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| CompanionError::corrupt(label, format!("decryption failed: {}", e)))
    }
}
