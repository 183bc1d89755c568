//! File key wrapping with RSA-OAEP (SHA-256)
//!
//! A wrapped key is the base64 text of `RSA-OAEP(recipient_public, raw_file_key)`.
//! One file is encrypted once; each additional holder only costs one wrap.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::rngs::OsRng;
use rsa::Oaep;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::handle::KeyHandle;
use crate::identity::{PrivateKey, PublicKey};
use crate::manager::KeyPairManager;
use crate::symmetric::FileKey;

/// Base64 text of a file key encrypted to one holder's public key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WrappedKey(String);

impl WrappedKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for WrappedKey {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl fmt::Display for WrappedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn padding() -> Oaep {
    Oaep::new::<Sha256>()
}

/// Wrap a file key for the holder of `recipient_spki` (SPKI DER bytes from
/// the key directory).
pub fn wrap_key(file_key: &FileKey, recipient_spki: &[u8]) -> Result<WrappedKey, CryptoError> {
    let recipient = PublicKey::from_spki_der(recipient_spki)?;
    wrap_key_for(file_key, &recipient)
}

/// Wrap a file key for an already parsed public key.
pub fn wrap_key_for(file_key: &FileKey, recipient: &PublicKey) -> Result<WrappedKey, CryptoError> {
    let raw = file_key.export()?;
    let ciphertext = recipient
        .rsa()
        .encrypt(&mut OsRng, padding(), &raw)
        .map_err(|e| CryptoError::InvalidRecipientKey(format!("RSA-OAEP encryption: {e}")))?;
    Ok(WrappedKey(STANDARD.encode(ciphertext)))
}

/// Unwrap a file key with an explicit private key.
///
/// Bad base64, an OAEP padding failure, or a payload that is not a 256-bit
/// key all fail with `UnwrapFailed`.
pub fn unwrap_key(private: &PrivateKey, wrapped: &WrappedKey) -> Result<FileKey, CryptoError> {
    let ciphertext = STANDARD
        .decode(wrapped.as_str().trim())
        .map_err(|_| CryptoError::UnwrapFailed)?;
    let raw = Zeroizing::new(
        private
            .rsa()
            .decrypt(padding(), &ciphertext)
            .map_err(|_| CryptoError::UnwrapFailed)?,
    );
    FileKey::from_slice(&raw).ok_or(CryptoError::UnwrapFailed)
}

/// Unwraps file keys with the private key from the local key store.
#[derive(Debug, Clone)]
pub struct KeyWrapper {
    keys: KeyPairManager,
}

impl KeyWrapper {
    pub fn new(keys: KeyPairManager) -> Self {
        Self { keys }
    }

    /// Unwrap with the private key from the local key store; `KeyNotFound`
    /// when the store is empty.
    pub fn unwrap(&self, wrapped: &WrappedKey) -> Result<FileKey, CryptoError> {
        let private = self.keys.load_local()?;
        unwrap_key(&private, wrapped)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::identity::export_public;
    use crate::store::MemoryKeyStore;
    use crate::symmetric::generate_file_key;
    use crate::testutil::{alice, bob};
    use crate::KEY_SIZE;

    fn wrapper_for(keys: Option<&crate::IdentityKeyPair>) -> KeyWrapper {
        let mgr = KeyPairManager::new(Arc::new(MemoryKeyStore::new()));
        if let Some(keys) = keys {
            mgr.install(keys).unwrap();
        }
        KeyWrapper::new(mgr)
    }

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        let file_key = generate_file_key();
        let spki = export_public(alice()).unwrap();

        let wrapped = wrap_key(&file_key, &spki).unwrap();
        let unwrapped = wrapper_for(Some(alice())).unwrap(&wrapped).unwrap();

        assert_eq!(file_key.as_bytes(), unwrapped.as_bytes());
    }

    #[test]
    fn test_wrapped_key_is_base64_of_modulus_size() {
        let wrapped = wrap_key_for(&generate_file_key(), &alice().public).unwrap();
        let raw = STANDARD.decode(wrapped.as_str()).unwrap();
        assert_eq!(raw.len(), crate::RSA_MODULUS_BITS / 8);
    }

    #[test]
    fn test_wrapping_is_randomized() {
        let file_key = generate_file_key();
        let a = wrap_key_for(&file_key, &alice().public).unwrap();
        let b = wrap_key_for(&file_key, &alice().public).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_cross_recipient_isolation() {
        let file_key = generate_file_key();
        let for_alice = wrap_key_for(&file_key, &alice().public).unwrap();

        let result = unwrap_key(&bob().private, &for_alice);
        assert!(matches!(result, Err(CryptoError::UnwrapFailed)));
    }

    #[test]
    fn test_unwrap_with_empty_store_is_key_not_found() {
        let wrapped = wrap_key_for(&generate_file_key(), &alice().public).unwrap();
        let result = wrapper_for(None).unwrap(&wrapped);
        assert!(matches!(result, Err(CryptoError::KeyNotFound)));
    }

    #[test]
    fn test_unwrap_corrupted_wrapped_key() {
        let wrapped = wrap_key_for(&generate_file_key(), &alice().public).unwrap();
        let mut raw = STANDARD.decode(wrapped.as_str()).unwrap();
        raw[17] ^= 0x40;
        let corrupted = WrappedKey::from(STANDARD.encode(raw));

        let result = unwrap_key(&alice().private, &corrupted);
        assert!(matches!(result, Err(CryptoError::UnwrapFailed)));

        let not_base64 = WrappedKey::from("%%%".to_string());
        assert!(matches!(
            unwrap_key(&alice().private, &not_base64),
            Err(CryptoError::UnwrapFailed)
        ));
    }

    #[test]
    fn test_unwrap_rejects_wrong_payload_size() {
        let short = FileKey::from_bytes([9u8; KEY_SIZE]);
        let raw = short.export().unwrap();
        let ciphertext = alice()
            .public
            .rsa()
            .encrypt(&mut OsRng, padding(), &raw[..16])
            .unwrap();
        let wrapped = WrappedKey::from(STANDARD.encode(ciphertext));

        let result = unwrap_key(&alice().private, &wrapped);
        assert!(matches!(result, Err(CryptoError::UnwrapFailed)));
    }

    #[test]
    fn test_wrap_invalid_recipient_key() {
        let result = wrap_key(&generate_file_key(), b"\x30\x03junk");
        assert!(matches!(result, Err(CryptoError::InvalidRecipientKey(_))));
    }

    #[test]
    fn test_wrapped_key_serde_is_plain_string() {
        let wrapped = WrappedKey::from("QUJD".to_string());
        assert_eq!(serde_json::to_string(&wrapped).unwrap(), "\"QUJD\"");
    }
}
