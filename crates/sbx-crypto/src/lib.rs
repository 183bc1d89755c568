//! sbx-crypto: client-side hybrid encryption for Strongbox
//!
//! Every file is encrypted once under its own random AES-256-GCM key. That
//! small key is then wrapped with RSA-OAEP (SHA-256) once per holder, so a
//! share only re-encrypts 32 bytes instead of the whole file.
//!
//! ```text
//! Identity key pair (RSA-2048, e=65537, per user, private half in the local key store)
//!   └── File key (per file, 256-bit random)
//!       ├── Envelope: nonce(12) || AES-256-GCM(ciphertext || tag(16))
//!       └── Wrapped key: base64(RSA-OAEP-SHA256(recipient_pub, file_key)), one per holder
//! ```

pub mod envelope;
pub mod error;
pub mod handle;
pub mod identity;
pub mod manager;
pub mod store;
pub mod symmetric;
pub mod wrap;

#[cfg(test)]
mod testutil;

pub use envelope::{decrypt_file, encrypt_file, EncryptedEnvelope};
pub use error::CryptoError;
pub use handle::{KeyAlgorithm, KeyFormat, KeyHandle};
pub use identity::{export_private, export_public, generate_identity, IdentityKeyPair, PrivateKey, PublicKey};
pub use manager::KeyPairManager;
pub use store::{KeySlot, KeyStore, KeyStoreError, MemoryKeyStore};
pub use symmetric::{generate_file_key, FileKey};
pub use wrap::{unwrap_key, wrap_key, wrap_key_for, KeyWrapper, WrappedKey};

/// Size of a file key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// RSA modulus size of identity keys
pub const RSA_MODULUS_BITS: usize = 2048;

/// RSA public exponent of identity keys
pub const RSA_PUBLIC_EXPONENT: u32 = 65537;
