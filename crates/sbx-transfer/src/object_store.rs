//! A [`Backend`] on top of any OpenDAL operator (S3, local fs, memory).
//!
//! Layout:
//! - `users/{user}/public-key`: base64 SPKI text
//! - `blobs/{file_id}`: encrypted envelope bytes
//! - `files/{file_id}.json`: [`FileRecord`] with one wrapped key per grantee
//!
//! Grants are enforced here the way a server would: only a grantee may fetch
//! download info or extend the grant to someone else.

use std::collections::BTreeMap;

use async_trait::async_trait;
use opendal::{ErrorKind, Operator};
use sbx_core::{DownloadInfo, FileId, FileMetadata, FileSummary, UserId};
use sbx_crypto::WrappedKey;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::backend::{Backend, BackendError};

/// Persisted per-file record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    pub owner: UserId,
    pub metadata: FileMetadata,
    pub uploaded_at: u64,
    /// holder -> that holder's wrapped copy of the file key
    pub grants: BTreeMap<UserId, WrappedKey>,
}

pub struct ObjectStoreBackend {
    op: Operator,
    // serializes read-modify-write of file records and key publication
    records: Mutex<()>,
}

impl ObjectStoreBackend {
    pub fn new(op: Operator) -> Self {
        Self {
            op,
            records: Mutex::new(()),
        }
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    async fn read_record(&self, file_id: &FileId) -> Result<FileRecord, BackendError> {
        let bytes = self
            .op
            .read(&record_path(file_id))
            .await
            .map_err(|e| storage_error(e, &format!("file {file_id}")))?;
        serde_json::from_slice(&bytes.to_vec())
            .map_err(|e| BackendError::Transport(format!("corrupt record for {file_id}: {e}")))
    }

    async fn write_record(&self, record: &FileRecord) -> Result<(), BackendError> {
        let bytes = serde_json::to_vec_pretty(record)
            .map_err(|e| BackendError::Transport(format!("serializing record: {e}")))?;
        self.op
            .write(&record_path(&record.id), bytes)
            .await
            .map_err(|e| storage_error(e, &format!("file {}", record.id)))?;
        Ok(())
    }
}

impl std::fmt::Debug for ObjectStoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreBackend")
            .field("scheme", &self.op.info().scheme())
            .finish_non_exhaustive()
    }
}

fn key_path(user: &UserId) -> Result<String, BackendError> {
    let id = user.as_str();
    if id.is_empty() || id.contains('/') || id.contains("..") {
        return Err(BackendError::Forbidden(format!("invalid identity: {user:?}")));
    }
    Ok(format!("users/{id}/public-key"))
}

fn blob_path(file_id: &FileId) -> String {
    format!("blobs/{file_id}")
}

fn record_path(file_id: &FileId) -> String {
    format!("files/{file_id}.json")
}

fn storage_error(e: opendal::Error, what: &str) -> BackendError {
    match e.kind() {
        ErrorKind::NotFound => BackendError::NotFound(what.to_string()),
        ErrorKind::PermissionDenied => BackendError::Forbidden(what.to_string()),
        _ => BackendError::Transport(format!("{what}: {e}")),
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[async_trait]
impl Backend for ObjectStoreBackend {
    async fn publish_public_key(&self, user: &UserId, spki_b64: &str) -> Result<(), BackendError> {
        let path = key_path(user)?;
        let _guard = self.records.lock().await;
        if self
            .op
            .exists(&path)
            .await
            .map_err(|e| storage_error(e, &path))?
        {
            return Err(BackendError::Conflict(format!(
                "{user} is already registered"
            )));
        }
        self.op
            .write(&path, spki_b64.as_bytes().to_vec())
            .await
            .map_err(|e| storage_error(e, &path))?;
        debug!(user = %user, "published public key");
        Ok(())
    }

    async fn fetch_public_key(&self, identity: &UserId) -> Result<String, BackendError> {
        let path = key_path(identity)?;
        let bytes = self
            .op
            .read(&path)
            .await
            .map_err(|e| storage_error(e, &format!("public key for {identity}")))?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| BackendError::Transport(format!("public key for {identity} is not text")))
    }

    async fn submit_upload(
        &self,
        owner: &UserId,
        envelope: Vec<u8>,
        wrapped: &WrappedKey,
        metadata: &FileMetadata,
    ) -> Result<FileId, BackendError> {
        key_path(owner)?;
        let id = FileId::generate();
        let blob = blob_path(&id);
        self.op
            .write(&blob, envelope)
            .await
            .map_err(|e| storage_error(e, &blob))?;

        let record = FileRecord {
            id,
            owner: owner.clone(),
            metadata: metadata.clone(),
            uploaded_at: now_secs(),
            grants: BTreeMap::from([(owner.clone(), wrapped.clone())]),
        };
        self.write_record(&record).await?;
        debug!(file_id = %id, owner = %owner, "stored upload");
        Ok(id)
    }

    async fn fetch_download_info(
        &self,
        caller: &UserId,
        file_id: &FileId,
    ) -> Result<DownloadInfo, BackendError> {
        let record = self.read_record(file_id).await?;
        let wrapped = record.grants.get(caller).ok_or_else(|| {
            BackendError::Forbidden(format!("{caller} holds no grant on {file_id}"))
        })?;
        Ok(DownloadInfo {
            location: blob_path(file_id),
            wrapped_key: wrapped.as_str().to_string(),
            metadata: record.metadata.clone(),
        })
    }

    async fn fetch_ciphertext(&self, location: &str) -> Result<Vec<u8>, BackendError> {
        if !location.starts_with("blobs/") || location.contains("..") {
            return Err(BackendError::NotFound(location.to_string()));
        }
        let bytes = self
            .op
            .read(location)
            .await
            .map_err(|e| storage_error(e, location))?;
        Ok(bytes.to_vec())
    }

    async fn submit_share(
        &self,
        sender: &UserId,
        file_id: &FileId,
        recipient: &UserId,
        wrapped: &WrappedKey,
    ) -> Result<(), BackendError> {
        let _guard = self.records.lock().await;
        let mut record = self.read_record(file_id).await?;
        if !record.grants.contains_key(sender) {
            return Err(BackendError::Forbidden(format!(
                "{sender} holds no grant on {file_id}"
            )));
        }
        let recipient_key = key_path(recipient)?;
        if !self
            .op
            .exists(&recipient_key)
            .await
            .map_err(|e| storage_error(e, &recipient_key))?
        {
            return Err(BackendError::NotFound(format!("public key for {recipient}")));
        }

        record.grants.insert(recipient.clone(), wrapped.clone());
        self.write_record(&record).await?;
        debug!(file_id = %file_id, recipient = %recipient, "added grant");
        Ok(())
    }

    async fn list_files(&self, caller: &UserId) -> Result<Vec<FileSummary>, BackendError> {
        let entries = match self.op.list("files/").await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage_error(e, "files/")),
        };

        let mut files = Vec::new();
        for entry in entries {
            let Some(id) = entry
                .name()
                .strip_suffix(".json")
                .and_then(|stem| stem.parse::<FileId>().ok())
            else {
                continue;
            };
            let record = self.read_record(&id).await?;
            if !record.grants.contains_key(caller) {
                continue;
            }
            files.push(FileSummary {
                id,
                filename: record.metadata.filename.clone(),
                owner: record.owner.clone(),
                size: record.metadata.size,
                uploaded_at: record.uploaded_at,
                shared_with_me: &record.owner != caller,
            });
        }
        files.sort_by(|a, b| {
            b.uploaded_at
                .cmp(&a.uploaded_at)
                .then_with(|| a.filename.cmp(&b.filename))
        });
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> ObjectStoreBackend {
        let op = Operator::new(opendal::services::Memory::default())
            .unwrap()
            .finish();
        ObjectStoreBackend::new(op)
    }

    fn alice() -> UserId {
        UserId::from("alice@example.com")
    }

    fn bob() -> UserId {
        UserId::from("bob@example.com")
    }

    #[tokio::test]
    async fn test_public_key_directory() {
        let b = backend();
        b.publish_public_key(&alice(), "c3BraQ==").await.unwrap();
        assert_eq!(b.fetch_public_key(&alice()).await.unwrap(), "c3BraQ==");
        assert!(matches!(
            b.publish_public_key(&alice(), "b3RoZXI=").await,
            Err(BackendError::Conflict(_))
        ));
        assert_eq!(b.fetch_public_key(&alice()).await.unwrap(), "c3BraQ==");
        assert_eq!(b.fetch_own_public_key(&alice()).await.unwrap(), "c3BraQ==");
        assert!(matches!(
            b.fetch_public_key(&bob()).await,
            Err(BackendError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_path_like_identity() {
        let b = backend();
        let evil = UserId::from("../blobs");
        assert!(matches!(
            b.publish_public_key(&evil, "x").await,
            Err(BackendError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_upload_grants_only_owner() {
        let b = backend();
        let wrapped = WrappedKey::from("d3JhcHBlZA==".to_string());
        let id = b
            .submit_upload(&alice(), vec![1, 2, 3], &wrapped, &FileMetadata::new("a.txt", 3))
            .await
            .unwrap();

        let info = b.fetch_download_info(&alice(), &id).await.unwrap();
        assert_eq!(info.wrapped_key, wrapped.as_str());
        assert_eq!(b.fetch_ciphertext(&info.location).await.unwrap(), vec![1, 2, 3]);

        assert!(matches!(
            b.fetch_download_info(&bob(), &id).await,
            Err(BackendError::Forbidden(_))
        ));
        assert!(matches!(
            b.fetch_download_info(&alice(), &FileId::generate()).await,
            Err(BackendError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_share_requires_grant_and_recipient_key() {
        let b = backend();
        let wrapped = WrappedKey::from("d3JhcHBlZA==".to_string());
        let id = b
            .submit_upload(&alice(), vec![0], &wrapped, &FileMetadata::new("a.txt", 1))
            .await
            .unwrap();

        assert!(matches!(
            b.submit_share(&alice(), &id, &bob(), &wrapped).await,
            Err(BackendError::NotFound(_))
        ));

        b.publish_public_key(&bob(), "Ym9i").await.unwrap();
        assert!(matches!(
            b.submit_share(&bob(), &id, &bob(), &wrapped).await,
            Err(BackendError::Forbidden(_))
        ));

        b.submit_share(&alice(), &id, &bob(), &wrapped).await.unwrap();
        assert!(b.fetch_download_info(&bob(), &id).await.is_ok());
    }

    #[tokio::test]
    async fn test_fetch_ciphertext_outside_blobs() {
        let b = backend();
        assert!(matches!(
            b.fetch_ciphertext("users/alice@example.com/public-key").await,
            Err(BackendError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_empty_store() {
        assert!(backend().list_files(&alice()).await.unwrap().is_empty());
    }
}
