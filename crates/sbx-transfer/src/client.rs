//! The transfer client: registration, restore, upload, download, share.
//!
//! Plaintext file keys exist only inside one pipeline call and are zeroized
//! when it returns. Nothing is persisted before the final submit step, so
//! dropping a flow future leaves no trace.

use std::sync::Arc;

use sbx_core::{FileId, FileMetadata, FileSummary, UserId};
use sbx_crypto::{
    decrypt_file, encrypt_file, export_private, generate_file_key, generate_identity,
    wrap_key_for, KeyPairManager, KeyStore, KeyWrapper, PrivateKey, PublicKey, WrappedKey,
};
use sbx_keystore::{Session, SessionEvent};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::backend::{Backend, BackendError};
use crate::error::{crypto, Stage, TransferError};

/// Result of a registration: the backup the user must keep.
pub struct Registered {
    pub user: UserId,
    /// PKCS#8 DER of the new private key
    pub backup: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for Registered {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registered")
            .field("user", &self.user)
            .field("backup", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uploaded {
    pub file_id: FileId,
    /// Size of the stored envelope (nonce + ciphertext + tag)
    pub ciphertext_len: usize,
}

pub struct Decrypted {
    pub file_id: FileId,
    pub metadata: FileMetadata,
    pub plaintext: Vec<u8>,
}

impl std::fmt::Debug for Decrypted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decrypted")
            .field("file_id", &self.file_id)
            .field("metadata", &self.metadata)
            .field("plaintext_len", &self.plaintext.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shared {
    pub file_id: FileId,
    pub recipient: UserId,
}

/// One user's view of the backend. Cheap to clone; clones share the key
/// store, the session, and the backend.
#[derive(Clone)]
pub struct TransferClient {
    user: UserId,
    backend: Arc<dyn Backend>,
    keys: KeyPairManager,
    wrapper: KeyWrapper,
    session: Session,
}

impl TransferClient {
    /// Client with no idle expiry.
    pub fn new(user: UserId, backend: Arc<dyn Backend>, store: Arc<dyn KeyStore>) -> Self {
        Self::with_session(user, backend, Session::new(KeyPairManager::new(store), None))
    }

    pub fn with_session(user: UserId, backend: Arc<dyn Backend>, session: Session) -> Self {
        let keys = session.keys().clone();
        Self {
            user,
            backend,
            wrapper: KeyWrapper::new(keys.clone()),
            keys,
            session,
        }
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn has_local_key(&self) -> Result<bool, TransferError> {
        self.keys.has_local_key().map_err(crypto(Stage::InstallKey))
    }

    /// Generate an identity, publish its public half, and install it locally.
    ///
    /// Returns the PKCS#8 backup. The key is installed only after the
    /// backend accepted the public key.
    pub async fn register(&self) -> Result<Registered, TransferError> {
        debug!(user = %self.user, "generating identity key pair");
        let keypair = tokio::task::spawn_blocking(generate_identity)
            .await
            .map_err(|e| TransferError::Runtime(format!("key generation task: {e}")))?
            .map_err(crypto(Stage::GenerateIdentity))?;

        let spki_b64 = keypair
            .public
            .to_base64()
            .map_err(crypto(Stage::GenerateIdentity))?;
        self.backend
            .publish_public_key(&self.user, &spki_b64)
            .await
            .map_err(|e| self.backend_error(Stage::PublishKey, e))?;

        self.keys
            .install(&keypair)
            .map_err(crypto(Stage::InstallKey))?;
        let backup = export_private(&keypair).map_err(crypto(Stage::InstallKey))?;
        self.session.touch();

        info!(user = %self.user, "registered identity");
        Ok(Registered {
            user: self.user.clone(),
            backup,
        })
    }

    /// Install a private key from its PKCS#8 backup.
    ///
    /// The backup must match the public key the backend holds for this user;
    /// the local store is untouched otherwise.
    pub async fn restore(&self, backup: &[u8]) -> Result<(), TransferError> {
        let private = PrivateKey::from_pkcs8_der(backup).map_err(crypto(Stage::Restore))?;

        let published = self
            .backend
            .fetch_own_public_key(&self.user)
            .await
            .map_err(|e| self.backend_error(Stage::FetchPublicKey, e))?;
        let published = PublicKey::from_base64(&published).map_err(crypto(Stage::FetchPublicKey))?;
        if private.public() != published {
            return Err(TransferError::Crypto {
                stage: Stage::Restore,
                source: sbx_crypto::CryptoError::MalformedKeyMaterial(format!(
                    "backup does not belong to {}",
                    self.user
                )),
            });
        }

        self.keys
            .import_private(backup)
            .map_err(crypto(Stage::Restore))?;
        self.session.touch();
        info!(user = %self.user, "restored private key");
        Ok(())
    }

    /// Encrypt `plaintext` under a fresh file key and store it, granting
    /// only the caller.
    pub async fn upload(
        &self,
        plaintext: &[u8],
        metadata: FileMetadata,
    ) -> Result<Uploaded, TransferError> {
        self.session.touch();
        let file_key = generate_file_key();

        debug!(user = %self.user, filename = %metadata.filename, bytes = plaintext.len(), "encrypting");
        let envelope = encrypt_file(plaintext, &file_key).map_err(crypto(Stage::Encrypt))?;

        let own_key = self
            .backend
            .fetch_own_public_key(&self.user)
            .await
            .map_err(|e| self.backend_error(Stage::FetchPublicKey, e))?;
        let own_key = PublicKey::from_base64(&own_key).map_err(crypto(Stage::Wrap))?;
        let wrapped = wrap_key_for(&file_key, &own_key).map_err(crypto(Stage::Wrap))?;
        drop(file_key);

        let ciphertext_len = envelope.len();
        let file_id = self
            .backend
            .submit_upload(&self.user, envelope.into_bytes(), &wrapped, &metadata)
            .await
            .map_err(|e| self.backend_error(Stage::Submit, e))?;

        info!(
            file_id = %file_id,
            user = %self.user,
            bytes = plaintext.len(),
            ciphertext_bytes = ciphertext_len,
            "uploaded"
        );
        Ok(Uploaded {
            file_id,
            ciphertext_len,
        })
    }

    /// Fetch, unwrap, and decrypt a file the caller holds a grant on.
    pub async fn download(&self, file_id: &FileId) -> Result<Decrypted, TransferError> {
        self.session.touch();
        let info = self
            .backend
            .fetch_download_info(&self.user, file_id)
            .await
            .map_err(|e| self.backend_error(Stage::FetchDownloadInfo, e))?;

        let envelope = self
            .backend
            .fetch_ciphertext(&info.location)
            .await
            .map_err(|e| self.backend_error(Stage::FetchCiphertext, e))?;
        debug!(file_id = %file_id, ciphertext_bytes = envelope.len(), "fetched ciphertext");

        let file_key = self
            .wrapper
            .unwrap(&WrappedKey::from(info.wrapped_key))
            .map_err(crypto(Stage::Unwrap))?;
        let plaintext = decrypt_file(&envelope, &file_key).map_err(crypto(Stage::Decrypt))?;

        info!(file_id = %file_id, user = %self.user, bytes = plaintext.len(), "downloaded");
        Ok(Decrypted {
            file_id: *file_id,
            metadata: info.metadata,
            plaintext,
        })
    }

    /// Grant `recipient` access by re-wrapping the caller's file key to the
    /// recipient's published public key. The blob is not touched.
    pub async fn share(
        &self,
        file_id: &FileId,
        recipient: &UserId,
    ) -> Result<Shared, TransferError> {
        self.session.touch();
        let info = self
            .backend
            .fetch_download_info(&self.user, file_id)
            .await
            .map_err(|e| self.backend_error(Stage::FetchDownloadInfo, e))?;
        let file_key = self
            .wrapper
            .unwrap(&WrappedKey::from(info.wrapped_key))
            .map_err(crypto(Stage::Unwrap))?;

        let recipient_key = match self.backend.fetch_public_key(recipient).await {
            Ok(key) => key,
            Err(BackendError::NotFound(_)) => {
                return Err(TransferError::RecipientUnavailable(recipient.clone()))
            }
            Err(e) => return Err(self.backend_error(Stage::FetchRecipientKey, e)),
        };
        let recipient_key = PublicKey::from_base64(&recipient_key).map_err(crypto(Stage::Wrap))?;
        let wrapped = wrap_key_for(&file_key, &recipient_key).map_err(crypto(Stage::Wrap))?;
        drop(file_key);

        self.backend
            .submit_share(&self.user, file_id, recipient, &wrapped)
            .await
            .map_err(|e| self.backend_error(Stage::Submit, e))?;

        info!(file_id = %file_id, user = %self.user, recipient = %recipient, "shared");
        Ok(Shared {
            file_id: *file_id,
            recipient: recipient.clone(),
        })
    }

    pub async fn list_files(&self) -> Result<Vec<FileSummary>, TransferError> {
        self.session.touch();
        self.backend
            .list_files(&self.user)
            .await
            .map_err(|e| self.backend_error(Stage::List, e))
    }

    /// Clear the local key store and notify session subscribers.
    pub fn logout(&self) -> Result<(), TransferError> {
        self.session
            .expire(SessionEvent::Logout)
            .map_err(crypto(Stage::Logout))
    }

    /// Wrap a backend failure, ending the session first when the backend
    /// says it is unauthorized.
    fn backend_error(&self, stage: Stage, source: BackendError) -> TransferError {
        if matches!(source, BackendError::Unauthorized) {
            if let Err(e) = self.session.expire(SessionEvent::Unauthorized) {
                warn!(user = %self.user, "failed to clear key store after unauthorized response: {e}");
            }
        }
        TransferError::Backend { stage, source }
    }
}

impl std::fmt::Debug for TransferClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferClient")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}
