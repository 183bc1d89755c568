//! Identifiers and records shared between the transfer client and the backend.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A user's identity as known to the backend's public-key directory
/// (an email address in practice).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Normalize surrounding whitespace and case so that directory lookups
    /// are stable regardless of how the identity was typed.
    pub fn new(identity: impl AsRef<str>) -> Self {
        Self(identity.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Backend-assigned identifier of an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(uuid::Uuid);

impl FileId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for FileId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s).map(Self)
    }
}

/// Plaintext metadata submitted alongside an encrypted upload.
///
/// The filename is visible to the backend; only file content is encrypted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub filename: String,
    /// Plaintext size in bytes
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl FileMetadata {
    pub fn new(filename: impl Into<String>, size: u64) -> Self {
        Self {
            filename: filename.into(),
            size,
            content_type: None,
        }
    }
}

/// What the backend returns when a holder asks to download a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadInfo {
    /// Opaque location of the ciphertext blob
    pub location: String,
    /// The caller's own wrapped copy of the file key (base64)
    pub wrapped_key: String,
    pub metadata: FileMetadata,
}

/// One row of a file listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummary {
    pub id: FileId,
    pub filename: String,
    pub owner: UserId,
    pub size: u64,
    /// Unix timestamp of the upload
    pub uploaded_at: u64,
    /// true when the caller is a share recipient rather than the owner
    pub shared_with_me: bool,
}
