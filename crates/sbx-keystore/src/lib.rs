//! sbx-keystore: where the identity private key lives on the client
//!
//! Backends (selected by `[keystore] backend` in sbx.toml):
//!   - `file`: DER files in a 0700 directory, atomic replace on write
//!   - `keychain`: platform keychain via the `keyring` crate
//!
//! Also home to the backup artifact (PKCS#8 DER file) and the session
//! expiry channel that clears the store on logout, idle timeout, or an
//! unauthorized backend response.

pub mod backup;
pub mod file;
pub mod keychain;
pub mod session;

pub use backup::{read_backup, write_backup};
pub use file::FileKeyStore;
pub use keychain::KeychainKeyStore;
pub use session::{Session, SessionEvent};

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use sbx_core::config::{expand_tilde, KeystoreBackend, KeystoreConfig};
use sbx_crypto::KeyStore;

/// Open the key store selected by config.
pub fn open_keystore(config: &KeystoreConfig) -> Result<Arc<dyn KeyStore>> {
    match config.backend {
        KeystoreBackend::File => {
            let dir = expand_tilde(&config.dir);
            tracing::debug!(dir = %dir.display(), "using file key store");
            Ok(Arc::new(FileKeyStore::open(&dir)?))
        }
        KeystoreBackend::Keychain => {
            if !keychain::is_available() {
                anyhow::bail!(
                    "platform keychain unavailable; set [keystore] backend = \"file\" in sbx.toml"
                );
            }
            tracing::debug!("using platform keychain key store");
            Ok(Arc::new(KeychainKeyStore::new()))
        }
    }
}

/// Where the last-activity stamp lives. Kept beside the key files even when
/// the keys themselves are in the platform keychain.
pub fn activity_path(config: &KeystoreConfig) -> PathBuf {
    expand_tilde(&config.dir).join("last-activity")
}
