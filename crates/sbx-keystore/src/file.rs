//! File-backed key store.
//!
//! Layout: `{dir}/private-key.der`, `{dir}/public-key.der`, mode 0600 inside a
//! 0700 directory. Writes go to a sibling temp file and are renamed into
//! place, so a concurrent reader sees either the old or the new key. Writers
//! in one process are serialized by a lock; across processes the last
//! writer wins.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use sbx_crypto::{KeySlot, KeyStore, KeyStoreError};
use zeroize::Zeroizing;

#[derive(Debug)]
pub struct FileKeyStore {
    dir: PathBuf,
    lock: RwLock<()>,
}

impl FileKeyStore {
    /// Open (creating if needed) a key store directory.
    pub fn open(dir: &Path) -> Result<Self, KeyStoreError> {
        std::fs::create_dir_all(dir)?;
        restrict_dir(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            lock: RwLock::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn slot_path(&self, slot: KeySlot) -> PathBuf {
        self.dir.join(format!("{}.der", slot.name()))
    }
}

impl KeyStore for FileKeyStore {
    fn get(&self, slot: KeySlot) -> Result<Option<Zeroizing<Vec<u8>>>, KeyStoreError> {
        let _guard = self.lock.read().map_err(|_| KeyStoreError::Poisoned)?;
        match std::fs::read(self.slot_path(slot)) {
            Ok(bytes) => Ok(Some(Zeroizing::new(bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, slot: KeySlot, bytes: &[u8]) -> Result<(), KeyStoreError> {
        let _guard = self.lock.write().map_err(|_| KeyStoreError::Poisoned)?;
        let path = self.slot_path(slot);
        let tmp = path.with_extension("der.tmp");
        {
            let mut file = create_private_file(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &path)?;
        tracing::debug!(slot = slot.name(), dir = %self.dir.display(), "wrote key store slot");
        Ok(())
    }

    fn clear(&self) -> Result<(), KeyStoreError> {
        let _guard = self.lock.write().map_err(|_| KeyStoreError::Poisoned)?;
        for slot in KeySlot::ALL {
            match std::fs::remove_file(self.slot_path(slot)) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// Create (truncating) a file readable only by the owner.
pub(crate) fn create_private_file(path: &Path) -> std::io::Result<std::fs::File> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

#[cfg(unix)]
fn restrict_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))
}

#[cfg(not(unix))]
fn restrict_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}
