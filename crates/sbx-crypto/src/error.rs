use thiserror::Error;

use crate::store::KeyStoreError;

/// Failures of the encryption engine.
///
/// Availability problems (`KeyNotFound`) and integrity problems
/// (`AuthenticationFailed`, `UnwrapFailed`) are distinct variants so callers
/// can offer a restore-from-backup path for the former only.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("private key not found in the local key store (restore it from your backup)")]
    KeyNotFound,

    #[error("malformed key material: {0}")]
    MalformedKeyMaterial(String),

    #[error("invalid recipient public key: {0}")]
    InvalidRecipientKey(String),

    #[error("file key unwrap failed: wrong private key or corrupted wrapped key")]
    UnwrapFailed,

    #[error("authentication failed: ciphertext corrupted or encrypted under another key")]
    AuthenticationFailed,

    #[error("key store: {0}")]
    KeyStore(#[from] KeyStoreError),

    #[error("crypto primitive failure: {0}")]
    Primitive(String),
}
