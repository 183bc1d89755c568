//! Per-file symmetric keys

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

use crate::error::CryptoError;
use crate::handle::{KeyAlgorithm, KeyFormat, KeyHandle};
use crate::KEY_SIZE;

/// A per-file 256-bit AES-GCM key. Zeroized on drop.
///
/// Never persisted on its own: it exists in plaintext only in memory and
/// otherwise only as a [`WrappedKey`](crate::WrappedKey).
pub struct FileKey {
    bytes: [u8; KEY_SIZE],
}

impl FileKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Import raw key bytes; `None` unless exactly `KEY_SIZE` bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; KEY_SIZE] = bytes.try_into().ok()?;
        Some(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl KeyHandle for FileKey {
    fn algorithm(&self) -> KeyAlgorithm {
        KeyAlgorithm::Aes256Gcm
    }

    fn format(&self) -> KeyFormat {
        KeyFormat::Raw
    }

    fn export(&self) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        Ok(Zeroizing::new(self.bytes.to_vec()))
    }
}

impl Drop for FileKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for FileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate a random 256-bit file key from the OS CSPRNG.
pub fn generate_file_key() -> FileKey {
    let mut bytes = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut bytes);
    FileKey::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_key_generation() {
        let k1 = generate_file_key();
        let k2 = generate_file_key();
        assert_ne!(k1.as_bytes(), k2.as_bytes(), "random keys must differ");
        assert_ne!(k1.as_bytes(), &[0u8; KEY_SIZE]);
    }

    #[test]
    fn test_from_slice_length_checked() {
        assert!(FileKey::from_slice(&[7u8; 16]).is_none());
        assert!(FileKey::from_slice(&[7u8; 33]).is_none());
        let key = FileKey::from_slice(&[7u8; KEY_SIZE]).unwrap();
        assert_eq!(key.as_bytes(), &[7u8; KEY_SIZE]);
    }

    #[test]
    fn test_export_is_raw_bytes() {
        let key = generate_file_key();
        assert_eq!(key.algorithm(), KeyAlgorithm::Aes256Gcm);
        assert_eq!(key.format(), KeyFormat::Raw);
        assert_eq!(key.export().unwrap().as_slice(), key.as_bytes());
    }

    #[test]
    fn test_debug_redacted() {
        let key = FileKey::from_bytes([0xAB; KEY_SIZE]);
        let shown = format!("{key:?}");
        assert!(shown.contains("REDACTED"));
        assert!(!shown.contains("171"));
    }
}
