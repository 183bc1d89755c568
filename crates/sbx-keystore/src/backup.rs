//! The private key backup artifact.
//!
//! Format: raw PKCS#8 DER bytes, written 0600. The backup is as sensitive as
//! the key itself and is only ever held in zeroizing buffers.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use zeroize::Zeroizing;

use crate::file::create_private_file;

/// Write a PKCS#8 backup. Refuses to overwrite an existing file.
pub fn write_backup(path: &Path, pkcs8: &[u8]) -> Result<()> {
    if path.exists() {
        anyhow::bail!("refusing to overwrite existing backup: {}", path.display());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating dir: {}", parent.display()))?;
    }
    let mut file = create_private_file(path)
        .with_context(|| format!("creating backup: {}", path.display()))?;
    file.write_all(pkcs8)
        .and_then(|()| file.sync_all())
        .with_context(|| format!("writing backup: {}", path.display()))?;
    tracing::info!(path = %path.display(), "wrote private key backup");
    Ok(())
}

/// Read backup bytes from disk. Parsing and installing the key is left to
/// the caller, which checks it against the published public key first.
pub fn read_backup(path: &Path) -> Result<Zeroizing<Vec<u8>>> {
    let bytes = std::fs::read(path).with_context(|| format!("reading backup: {}", path.display()))?;
    if bytes.is_empty() {
        anyhow::bail!("backup file is empty: {}", path.display());
    }
    Ok(Zeroizing::new(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_refuses_overwrite() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("backup.der");
        write_backup(&path, b"first").unwrap();
        assert!(write_backup(&path, b"second").is_err());
        assert_eq!(read_backup(&path).unwrap().as_slice(), b"first");
    }

    #[test]
    fn test_read_missing_backup() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = read_backup(&tmp.path().join("absent.der")).unwrap_err();
        assert!(err.to_string().contains("absent.der"));
    }

    #[test]
    fn test_read_empty_backup() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("empty.der");
        std::fs::write(&path, b"").unwrap();
        assert!(read_backup(&path).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_backup_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nested/backup.der");
        write_backup(&path, b"pkcs8").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
