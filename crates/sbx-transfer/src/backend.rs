//! The backend collaborator: public-key directory, blob store, and grant records.

use async_trait::async_trait;
use sbx_core::{DownloadInfo, FileId, FileMetadata, FileSummary, UserId};
use sbx_crypto::WrappedKey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The write would replace something that must stay immutable.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The session is no longer valid; callers must clear local key material.
    #[error("unauthorized")]
    Unauthorized,

    #[error("transport: {0}")]
    Transport(String),
}

/// Everything the transfer client needs from the server side.
///
/// Public keys travel as base64 SPKI text, envelopes as raw bytes.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Publish a freshly generated public key (registration).
    ///
    /// An identity is published once; a second publish is `Conflict`.
    async fn publish_public_key(&self, user: &UserId, spki_b64: &str) -> Result<(), BackendError>;

    async fn fetch_public_key(&self, identity: &UserId) -> Result<String, BackendError>;

    async fn fetch_own_public_key(&self, user: &UserId) -> Result<String, BackendError> {
        self.fetch_public_key(user).await
    }

    async fn submit_upload(
        &self,
        owner: &UserId,
        envelope: Vec<u8>,
        wrapped: &WrappedKey,
        metadata: &FileMetadata,
    ) -> Result<FileId, BackendError>;

    /// Location of the blob plus the caller's own wrapped key.
    async fn fetch_download_info(
        &self,
        caller: &UserId,
        file_id: &FileId,
    ) -> Result<DownloadInfo, BackendError>;

    async fn fetch_ciphertext(&self, location: &str) -> Result<Vec<u8>, BackendError>;

    async fn submit_share(
        &self,
        sender: &UserId,
        file_id: &FileId,
        recipient: &UserId,
        wrapped: &WrappedKey,
    ) -> Result<(), BackendError>;

    /// Files the caller owns or holds a grant on.
    async fn list_files(&self, caller: &UserId) -> Result<Vec<FileSummary>, BackendError>;
}
