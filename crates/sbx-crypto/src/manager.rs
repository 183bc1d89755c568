//! Key pair lifecycle against the local key store: install, import, load, forget

use std::sync::Arc;

use crate::error::CryptoError;
use crate::handle::KeyHandle;
use crate::identity::{IdentityKeyPair, PrivateKey};
use crate::store::{KeySlot, KeyStore};

/// Owns the user's identity key pair as persisted in a [`KeyStore`].
///
/// Cheap to clone; all clones share the same store.
#[derive(Clone)]
pub struct KeyPairManager {
    store: Arc<dyn KeyStore>,
}

impl KeyPairManager {
    pub fn new(store: Arc<dyn KeyStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn KeyStore> {
        &self.store
    }

    /// Persist a freshly generated identity (registration).
    pub fn install(&self, keypair: &IdentityKeyPair) -> Result<(), CryptoError> {
        self.store_private(&keypair.private)?;
        tracing::debug!("installed identity key pair in local key store");
        Ok(())
    }

    /// Restore a private key from its PKCS#8 backup into the local key store.
    ///
    /// The store is left untouched if the backup does not parse.
    pub fn import_private(&self, backup: &[u8]) -> Result<PrivateKey, CryptoError> {
        let private = PrivateKey::from_pkcs8_der(backup)?;
        self.store_private(&private)?;
        tracing::info!("restored private key from backup");
        Ok(private)
    }

    /// Read the current private key from the local key store.
    pub fn load_local(&self) -> Result<PrivateKey, CryptoError> {
        let der = self
            .store
            .get(KeySlot::PrivateKey)?
            .ok_or(CryptoError::KeyNotFound)?;
        PrivateKey::from_pkcs8_der(&der)
    }

    pub fn has_local_key(&self) -> Result<bool, CryptoError> {
        Ok(self.store.get(KeySlot::PrivateKey)?.is_some())
    }

    /// Drop all key material from the local key store (logout / expiry).
    pub fn forget(&self) -> Result<(), CryptoError> {
        self.store.clear()?;
        tracing::debug!("cleared local key store");
        Ok(())
    }

    fn store_private(&self, private: &PrivateKey) -> Result<(), CryptoError> {
        let pkcs8 = private.export()?;
        let spki = private.public().export()?;
        self.store.set(KeySlot::PrivateKey, &pkcs8)?;
        self.store.set(KeySlot::PublicKey, &spki)?;
        Ok(())
    }
}

impl std::fmt::Debug for KeyPairManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPairManager").finish_non_exhaustive()
    }
}
