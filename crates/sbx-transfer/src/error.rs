use std::fmt;

use sbx_core::UserId;
use sbx_crypto::CryptoError;
use thiserror::Error;

use crate::backend::BackendError;

/// Pipeline step a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    GenerateIdentity,
    PublishKey,
    InstallKey,
    Restore,
    GenerateKey,
    Encrypt,
    FetchPublicKey,
    Wrap,
    Submit,
    FetchDownloadInfo,
    FetchCiphertext,
    Unwrap,
    Decrypt,
    FetchRecipientKey,
    List,
    Logout,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::GenerateIdentity => "generate identity",
            Stage::PublishKey => "publish public key",
            Stage::InstallKey => "install key",
            Stage::Restore => "restore backup",
            Stage::GenerateKey => "generate file key",
            Stage::Encrypt => "encrypt",
            Stage::FetchPublicKey => "fetch public key",
            Stage::Wrap => "wrap file key",
            Stage::Submit => "submit",
            Stage::FetchDownloadInfo => "fetch download info",
            Stage::FetchCiphertext => "fetch ciphertext",
            Stage::Unwrap => "unwrap file key",
            Stage::Decrypt => "decrypt",
            Stage::FetchRecipientKey => "fetch recipient key",
            Stage::List => "list files",
            Stage::Logout => "logout",
        };
        f.write_str(s)
    }
}

/// Flat classification of a failure, independent of the stage it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    KeyNotFound,
    MalformedKeyMaterial,
    InvalidRecipientKey,
    UnwrapFailed,
    AuthenticationFailed,
    RecipientUnavailable,
    NotFound,
    Forbidden,
    Conflict,
    Unauthorized,
    Transport,
    KeyStore,
    Internal,
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("{stage}: {source}")]
    Crypto {
        stage: Stage,
        #[source]
        source: CryptoError,
    },

    #[error("{stage}: {source}")]
    Backend {
        stage: Stage,
        #[source]
        source: BackendError,
    },

    #[error("recipient has no published public key: {0}")]
    RecipientUnavailable(UserId),

    #[error("runtime: {0}")]
    Runtime(String),
}

impl TransferError {
    pub fn kind(&self) -> FailureKind {
        match self {
            TransferError::Crypto { source, .. } => match source {
                CryptoError::KeyNotFound => FailureKind::KeyNotFound,
                CryptoError::MalformedKeyMaterial(_) => FailureKind::MalformedKeyMaterial,
                CryptoError::InvalidRecipientKey(_) => FailureKind::InvalidRecipientKey,
                CryptoError::UnwrapFailed => FailureKind::UnwrapFailed,
                CryptoError::AuthenticationFailed => FailureKind::AuthenticationFailed,
                CryptoError::KeyStore(_) => FailureKind::KeyStore,
                CryptoError::Primitive(_) => FailureKind::Internal,
            },
            TransferError::Backend { source, .. } => match source {
                BackendError::NotFound(_) => FailureKind::NotFound,
                BackendError::Forbidden(_) => FailureKind::Forbidden,
                BackendError::Conflict(_) => FailureKind::Conflict,
                BackendError::Unauthorized => FailureKind::Unauthorized,
                BackendError::Transport(_) => FailureKind::Transport,
            },
            TransferError::RecipientUnavailable(_) => FailureKind::RecipientUnavailable,
            TransferError::Runtime(_) => FailureKind::Internal,
        }
    }

    /// The pipeline stage, when the failure is tied to one.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            TransferError::Crypto { stage, .. } | TransferError::Backend { stage, .. } => {
                Some(*stage)
            }
            TransferError::RecipientUnavailable(_) => Some(Stage::FetchRecipientKey),
            TransferError::Runtime(_) => None,
        }
    }
}

pub(crate) fn crypto(stage: Stage) -> impl FnOnce(CryptoError) -> TransferError {
    move |source| TransferError::Crypto { stage, source }
}
