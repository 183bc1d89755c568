//! Platform keychain key store.
//!
//! Uses the `keyring` crate for cross-platform access:
//! - macOS: Keychain Services
//! - Linux: GNOME Keyring / Secret Service (D-Bus)
//! - Windows: Credential Manager (DPAPI)
//!
//! Keychains hold strings, so slots are stored as base64 of the DER bytes.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sbx_crypto::{KeySlot, KeyStore, KeyStoreError};
use secrecy::{ExposeSecret, SecretString};
use zeroize::{Zeroize, Zeroizing};

const SERVICE_NAME: &str = "strongbox";

/// Key store backed by the platform keychain, one entry per [`KeySlot`].
#[derive(Debug, Clone)]
pub struct KeychainKeyStore {
    service: String,
}

impl KeychainKeyStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    /// Use a distinct keychain service name (one per profile or test).
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, slot: KeySlot) -> Result<keyring::Entry, KeyStoreError> {
        keyring::Entry::new(&self.service, slot.name())
            .map_err(|e| KeyStoreError::Backend(format!("keychain entry creation: {e}")))
    }
}

impl Default for KeychainKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyStore for KeychainKeyStore {
    fn get(&self, slot: KeySlot) -> Result<Option<Zeroizing<Vec<u8>>>, KeyStoreError> {
        let Some(secret) = get_secret(&self.entry(slot)?, slot)? else {
            return Ok(None);
        };
        let bytes = STANDARD
            .decode(secret.expose_secret())
            .map_err(|e| KeyStoreError::Backend(format!("keychain entry '{}' is not base64: {e}", slot.name())))?;
        Ok(Some(Zeroizing::new(bytes)))
    }

    fn set(&self, slot: KeySlot, bytes: &[u8]) -> Result<(), KeyStoreError> {
        let secret = SecretString::from(STANDARD.encode(bytes));
        store_secret(&self.entry(slot)?, slot, &secret)
    }

    fn clear(&self) -> Result<(), KeyStoreError> {
        for slot in KeySlot::ALL {
            delete_secret(&self.entry(slot)?, slot)?;
        }
        Ok(())
    }
}

fn store_secret(entry: &keyring::Entry, slot: KeySlot, secret: &SecretString) -> Result<(), KeyStoreError> {
    entry
        .set_password(secret.expose_secret())
        .map_err(|e| KeyStoreError::Backend(format!("keychain store for '{}': {e}", slot.name())))?;
    tracing::debug!(slot = slot.name(), "stored key in platform keychain");
    Ok(())
}

fn get_secret(entry: &keyring::Entry, slot: KeySlot) -> Result<Option<SecretString>, KeyStoreError> {
    match entry.get_password() {
        Ok(mut password) => {
            let secret = SecretString::from(password.clone());
            password.zeroize();
            Ok(Some(secret))
        }
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(KeyStoreError::Backend(format!(
            "keychain get for '{}': {e}",
            slot.name()
        ))),
    }
}

fn delete_secret(entry: &keyring::Entry, slot: KeySlot) -> Result<(), KeyStoreError> {
    match entry.delete_credential() {
        Ok(()) => {
            tracing::debug!(slot = slot.name(), "deleted key from platform keychain");
            Ok(())
        }
        Err(keyring::Error::NoEntry) => Ok(()), // already deleted
        Err(e) => Err(KeyStoreError::Backend(format!(
            "keychain delete for '{}': {e}",
            slot.name()
        ))),
    }
}

/// Check if the platform keychain is available.
pub fn is_available() -> bool {
    keyring::Entry::new(SERVICE_NAME, "__strongbox_probe__").is_ok()
}
