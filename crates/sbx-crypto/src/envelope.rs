//! AES-256-GCM file envelopes
//!
//! Envelope format (binary):
//! ```text
//! [12 bytes: random nonce][N bytes: ciphertext][16 bytes: GCM tag]
//! ```
//!
//! A fresh nonce is drawn for every encryption, so encrypting the same
//! plaintext twice under the same key yields different envelopes.

use aes_gcm::aead::consts::U12;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::Aes256Gcm;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::CryptoError;
use crate::symmetric::FileKey;
use crate::{NONCE_SIZE, TAG_SIZE};

type GcmNonce = aes_gcm::Nonce<U12>;

/// A self-describing encrypted file: nonce plus ciphertext-with-tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    nonce: [u8; NONCE_SIZE],
    ciphertext: Vec<u8>,
}

impl EncryptedEnvelope {
    /// Split serialized envelope bytes into nonce and ciphertext.
    ///
    /// Anything shorter than a nonce plus a tag cannot be authenticated and is
    /// rejected as `AuthenticationFailed`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < NONCE_SIZE + TAG_SIZE {
            tracing::debug!(len = bytes.len(), "envelope too short to authenticate");
            return Err(CryptoError::AuthenticationFailed);
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_SIZE);
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        nonce_bytes.copy_from_slice(nonce);
        Ok(Self {
            nonce: nonce_bytes,
            ciphertext: ciphertext.to_vec(),
        })
    }

    pub fn nonce(&self) -> &[u8; NONCE_SIZE] {
        &self.nonce
    }

    /// Ciphertext including the trailing GCM tag
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Serialized length: `NONCE_SIZE + ciphertext.len()`
    pub fn len(&self) -> usize {
        NONCE_SIZE + self.ciphertext.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// `nonce || ciphertext+tag`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.to_bytes()
    }

    /// Authenticated decryption of this envelope.
    pub fn open(&self, key: &FileKey) -> Result<Vec<u8>, CryptoError> {
        let cipher = Aes256Gcm::new(key.as_bytes().into());
        cipher
            .decrypt(GcmNonce::from_slice(&self.nonce), self.ciphertext.as_ref())
            .map_err(|_| CryptoError::AuthenticationFailed)
    }
}

/// Encrypt file content under a file key with a fresh random nonce.
pub fn encrypt_file(plaintext: &[u8], key: &FileKey) -> Result<EncryptedEnvelope, CryptoError> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(GcmNonce::from_slice(&nonce), plaintext)
        .map_err(|e| CryptoError::Primitive(format!("AES-GCM encryption: {e}")))?;

    Ok(EncryptedEnvelope { nonce, ciphertext })
}

/// Decrypt serialized envelope bytes (`nonce || ciphertext+tag`).
///
/// Either the whole plaintext is returned or `AuthenticationFailed`; no
/// partially decrypted data ever escapes.
pub fn decrypt_file(envelope: &[u8], key: &FileKey) -> Result<Vec<u8>, CryptoError> {
    EncryptedEnvelope::from_bytes(envelope)?.open(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symmetric::generate_file_key;
    use proptest::prelude::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = generate_file_key();
        let envelope = encrypt_file(b"hello file", &key).unwrap();
        let plaintext = decrypt_file(&envelope.to_bytes(), &key).unwrap();
        assert_eq!(plaintext, b"hello file");
    }

    #[test]
    fn test_encrypt_decrypt_empty() {
        let key = generate_file_key();
        let envelope = encrypt_file(b"", &key).unwrap();
        assert_eq!(envelope.len(), NONCE_SIZE + TAG_SIZE);
        assert_eq!(decrypt_file(&envelope.to_bytes(), &key).unwrap(), b"");
    }

    #[test]
    fn test_envelope_size() {
        let key = generate_file_key();
        let envelope = encrypt_file(&[0u8; 1000], &key).unwrap();

        // nonce (12) + plaintext (1000) + tag (16) = 1028
        assert_eq!(envelope.to_bytes().len(), 12 + 1000 + 16);
    }

    #[test]
    fn test_same_plaintext_different_envelopes() {
        let key = generate_file_key();
        let a = encrypt_file(b"identical", &key).unwrap();
        let b = encrypt_file(b"identical", &key).unwrap();
        assert_ne!(a.nonce(), b.nonce());
        assert_ne!(a.to_bytes(), b.to_bytes());
    }

    #[test]
    fn test_decrypt_wrong_key() {
        let key1 = generate_file_key();
        let key2 = generate_file_key();
        let envelope = encrypt_file(b"secret data", &key1).unwrap();
        let result = decrypt_file(&envelope.to_bytes(), &key2);
        assert!(matches!(result, Err(CryptoError::AuthenticationFailed)));
    }

    #[test]
    fn test_every_bit_flip_detected() {
        let key = generate_file_key();
        let bytes = encrypt_file(b"tamper me", &key).unwrap().to_bytes();

        for byte in 0..bytes.len() {
            for bit in 0..8 {
                let mut tampered = bytes.clone();
                tampered[byte] ^= 1 << bit;
                let result = decrypt_file(&tampered, &key);
                assert!(
                    matches!(result, Err(CryptoError::AuthenticationFailed)),
                    "flip of byte {byte} bit {bit} must fail authentication"
                );
            }
        }
    }

    #[test]
    fn test_truncated_envelope() {
        let key = generate_file_key();
        let bytes = encrypt_file(b"some content", &key).unwrap().to_bytes();

        assert!(matches!(
            decrypt_file(&bytes[..NONCE_SIZE + TAG_SIZE - 1], &key),
            Err(CryptoError::AuthenticationFailed)
        ));
        assert!(matches!(
            decrypt_file(&bytes[..bytes.len() - 1], &key),
            Err(CryptoError::AuthenticationFailed)
        ));
        assert!(matches!(
            decrypt_file(&[], &key),
            Err(CryptoError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_from_bytes_splits_nonce() {
        let key = generate_file_key();
        let envelope = encrypt_file(b"layout", &key).unwrap();
        let bytes = envelope.to_bytes();
        let parsed = EncryptedEnvelope::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.nonce().as_slice(), &bytes[..NONCE_SIZE]);
        assert_eq!(parsed.ciphertext(), &bytes[NONCE_SIZE..]);
        assert_eq!(parsed, envelope);
    }

    proptest! {
        #[test]
        fn prop_roundtrip(plaintext in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let key = generate_file_key();
            let envelope = encrypt_file(&plaintext, &key).unwrap();
            prop_assert_eq!(decrypt_file(&envelope.to_bytes(), &key).unwrap(), plaintext);
        }
    }
}
