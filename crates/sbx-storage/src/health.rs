//! Reachability check against the public-key directory

use anyhow::{Context, Result};
use opendal::{ErrorKind, Operator};

const USERS_PREFIX: &str = "users/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageHealth {
    /// Identities with a published public key
    pub registered_users: usize,
}

/// List the key directory. A store nobody has registered in yet is healthy
/// with zero users; any other listing failure is an error.
pub async fn check_health(op: &Operator) -> Result<StorageHealth> {
    let entries = match op.list(USERS_PREFIX).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
        Err(e) => {
            return Err(e).with_context(|| {
                format!("listing {USERS_PREFIX} on {} storage", op.info().scheme())
            })
        }
    };
    let registered_users = entries
        .iter()
        .filter(|entry| entry.path() != USERS_PREFIX && entry.metadata().is_dir())
        .count();
    tracing::debug!(registered_users, "storage reachable");
    Ok(StorageHealth { registered_users })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::{build_fs_operator, build_memory_operator};

    #[tokio::test]
    async fn test_fresh_store_has_no_users() {
        let op = build_memory_operator().unwrap();
        assert_eq!(check_health(&op).await.unwrap().registered_users, 0);
    }

    #[tokio::test]
    async fn test_counts_published_identities() {
        let tmp = tempfile::TempDir::new().unwrap();
        let op = build_fs_operator(tmp.path()).unwrap();
        assert_eq!(check_health(&op).await.unwrap().registered_users, 0);

        op.write("users/alice@example.com/public-key", b"spki".to_vec())
            .await
            .unwrap();
        op.write("users/bob@example.com/public-key", b"spki".to_vec())
            .await
            .unwrap();
        op.write("blobs/0000", vec![0u8; 4]).await.unwrap();

        assert_eq!(check_health(&op).await.unwrap().registered_users, 2);
    }
}
