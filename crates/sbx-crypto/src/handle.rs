//! Capability view over key objects.
//!
//! Key types never implement `Serialize`; the only way to get bytes out of
//! one is an explicit [`KeyHandle::export`].

use zeroize::Zeroizing;

use crate::error::CryptoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    /// RSA-OAEP with SHA-256 for both the hash and MGF1
    RsaOaepSha256,
    /// AES-256 in Galois/Counter Mode
    Aes256Gcm,
}

/// Encoding produced by [`KeyHandle::export`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFormat {
    /// SubjectPublicKeyInfo DER
    Spki,
    /// PKCS#8 PrivateKeyInfo DER
    Pkcs8,
    /// Raw key bytes
    Raw,
}

pub trait KeyHandle {
    fn algorithm(&self) -> KeyAlgorithm;

    fn format(&self) -> KeyFormat;

    /// Export the key in its [`format`](KeyHandle::format). The buffer is
    /// zeroized when dropped.
    fn export(&self) -> Result<Zeroizing<Vec<u8>>, CryptoError>;
}
