//! At-rest protection for transaction `amount_details`.
//!
//! The key is derived deterministically from the configured secret so that every process
//! sharing the secret can read rows written by any other. Each value gets a fresh nonce.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use thiserror::Error;

const KEY_DERIVATION_SALT: &[u8] = b"flowmaster.amount-details.v1";
const KEY_DERIVATION_ROUNDS: u32 = 100_000;
const NONCE_LEN: usize = 12;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("encryption secret must not be empty")]
    EmptySecret,
    #[error("encryption failed")]
    Encrypt,
    #[error("ciphertext is not valid base64: {0}")]
    Encoding(String),
    #[error("ciphertext is too short")]
    Truncated,
    #[error("ciphertext failed authentication")]
    Decrypt,
    #[error("decrypted value is not valid utf-8")]
    Utf8,
}

#[derive(Clone)]
pub struct DetailCipher {
    cipher: ChaCha20Poly1305,
}

impl std::fmt::Debug for DetailCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetailCipher").finish_non_exhaustive()
    }
}

impl DetailCipher {
    pub fn from_secret(secret: &SecretString) -> Result<Self, CryptoError> {
        let secret = secret.expose_secret();
        if secret.is_empty() {
            return Err(CryptoError::EmptySecret);
        }

        let mut key = [0u8; 32];
        pbkdf2_hmac::<Sha256>(
            secret.as_bytes(),
            KEY_DERIVATION_SALT,
            KEY_DERIVATION_ROUNDS,
            &mut key,
        );
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        Ok(Self { cipher })
    }

    /// Returns url-safe base64 of `nonce || ciphertext`.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| CryptoError::Encrypt)?;

        let mut packed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        packed.extend_from_slice(&nonce);
        packed.extend_from_slice(&ciphertext);
        Ok(URL_SAFE.encode(packed))
    }

    /// Fails on any corruption instead of handing ciphertext back as plaintext.
    pub fn decrypt(&self, encoded: &str) -> Result<String, CryptoError> {
        let packed =
            URL_SAFE.decode(encoded).map_err(|error| CryptoError::Encoding(error.to_string()))?;
        if packed.len() <= NONCE_LEN {
            return Err(CryptoError::Truncated);
        }

        let (nonce, ciphertext) = packed.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Decrypt)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::Utf8)
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::{CryptoError, DetailCipher};

    fn cipher(secret: &str) -> DetailCipher {
        DetailCipher::from_secret(&SecretString::from(secret.to_string())).expect("cipher")
    }

    #[test]
    fn decrypts_what_it_encrypts() {
        let cipher = cipher("unit-test-secret-value");
        let encrypted = cipher.encrypt("微信80, 支付宝100").expect("encrypt");

        assert_ne!(encrypted, "微信80, 支付宝100");
        assert_eq!(cipher.decrypt(&encrypted).expect("decrypt"), "微信80, 支付宝100");
    }

    #[test]
    fn same_secret_derives_the_same_key() {
        let encrypted = cipher("shared-secret-value-1").encrypt("现金20").expect("encrypt");
        let other_process = cipher("shared-secret-value-1");

        assert_eq!(other_process.decrypt(&encrypted).expect("decrypt"), "现金20");
    }

    #[test]
    fn each_encryption_uses_a_fresh_nonce() {
        let cipher = cipher("unit-test-secret-value");
        let first = cipher.encrypt("same").expect("encrypt");
        let second = cipher.encrypt("same").expect("encrypt");
        assert_ne!(first, second);
    }

    #[test]
    fn wrong_secret_fails_loudly() {
        let encrypted = cipher("first-secret-value-01").encrypt("details").expect("encrypt");
        let result = cipher("second-secret-value-02").decrypt(&encrypted);
        assert_eq!(result, Err(CryptoError::Decrypt));
    }

    #[test]
    fn garbage_input_is_rejected() {
        let cipher = cipher("unit-test-secret-value");
        assert!(matches!(cipher.decrypt("not base64!"), Err(CryptoError::Encoding(_))));
        assert_eq!(cipher.decrypt("AAAA"), Err(CryptoError::Truncated));
    }

    #[test]
    fn empty_secret_is_rejected() {
        let result = DetailCipher::from_secret(&SecretString::from(String::new()));
        assert!(matches!(result, Err(CryptoError::EmptySecret)));
    }
}
