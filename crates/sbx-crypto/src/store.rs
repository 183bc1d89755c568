//! The local key store seam.
//!
//! The private key lives in exactly one place on the client. Implementations
//! must serialize their own writes; readers must never observe a torn entry.
//! Persistent implementations live in `sbx-keystore`; [`MemoryKeyStore`] is
//! the session-only variant.

use std::collections::HashMap;
use std::sync::RwLock;

use zeroize::Zeroizing;

/// Named entries held by a key store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeySlot {
    /// PKCS#8 DER of the identity private key
    PrivateKey,
    /// SPKI DER of the identity public key (cache)
    PublicKey,
}

impl KeySlot {
    pub const ALL: [KeySlot; 2] = [KeySlot::PrivateKey, KeySlot::PublicKey];

    /// Stable name used as file name or keychain account
    pub fn name(self) -> &'static str {
        match self {
            KeySlot::PrivateKey => "private-key",
            KeySlot::PublicKey => "public-key",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Backend(String),

    #[error("key store lock poisoned")]
    Poisoned,
}

/// Injectable holder of the user's key material.
pub trait KeyStore: Send + Sync {
    /// Read a slot; `Ok(None)` when it was never set or has been cleared.
    fn get(&self, slot: KeySlot) -> Result<Option<Zeroizing<Vec<u8>>>, KeyStoreError>;

    /// Replace a slot's contents.
    fn set(&self, slot: KeySlot, bytes: &[u8]) -> Result<(), KeyStoreError>;

    /// Remove every slot. Clearing an empty store succeeds.
    fn clear(&self) -> Result<(), KeyStoreError>;
}

/// Process-memory key store; contents vanish with the process.
#[derive(Default)]
pub struct MemoryKeyStore {
    slots: RwLock<HashMap<KeySlot, Zeroizing<Vec<u8>>>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStore for MemoryKeyStore {
    fn get(&self, slot: KeySlot) -> Result<Option<Zeroizing<Vec<u8>>>, KeyStoreError> {
        let slots = self.slots.read().map_err(|_| KeyStoreError::Poisoned)?;
        Ok(slots.get(&slot).cloned())
    }

    fn set(&self, slot: KeySlot, bytes: &[u8]) -> Result<(), KeyStoreError> {
        let mut slots = self.slots.write().map_err(|_| KeyStoreError::Poisoned)?;
        slots.insert(slot, Zeroizing::new(bytes.to_vec()));
        Ok(())
    }

    fn clear(&self) -> Result<(), KeyStoreError> {
        let mut slots = self.slots.write().map_err(|_| KeyStoreError::Poisoned)?;
        slots.clear();
        Ok(())
    }
}

impl std::fmt::Debug for MemoryKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.slots.read().map(|s| s.len()).unwrap_or_default();
        f.debug_struct("MemoryKeyStore")
            .field("slots", &count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_set_get_clear() {
        let store = MemoryKeyStore::new();
        assert!(store.get(KeySlot::PrivateKey).unwrap().is_none());

        store.set(KeySlot::PrivateKey, b"pkcs8").unwrap();
        store.set(KeySlot::PublicKey, b"spki").unwrap();
        assert_eq!(store.get(KeySlot::PrivateKey).unwrap().unwrap().as_slice(), b"pkcs8");
        assert_eq!(store.get(KeySlot::PublicKey).unwrap().unwrap().as_slice(), b"spki");

        store.clear().unwrap();
        for slot in KeySlot::ALL {
            assert!(store.get(slot).unwrap().is_none());
        }
        store.clear().unwrap();
    }

    #[test]
    fn test_slot_names_distinct() {
        assert_ne!(KeySlot::PrivateKey.name(), KeySlot::PublicKey.name());
    }
}
