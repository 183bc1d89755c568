//! sbx-transfer: the client side of strongbox file exchange
//!
//! Every flow is a linear pipeline over the crypto engine and a [`Backend`]:
//! - upload:   generate file key, encrypt, wrap for self, submit
//! - download: fetch grant and blob, unwrap, decrypt
//! - share:    unwrap own grant, wrap for recipient, submit
//!
//! The backend only ever sees ciphertext, wrapped keys, and public keys.

pub mod backend;
pub mod client;
pub mod error;
pub mod object_store;

pub use backend::{Backend, BackendError};
pub use client::{Decrypted, Registered, Shared, TransferClient, Uploaded};
pub use error::{FailureKind, Stage, TransferError};
pub use object_store::ObjectStoreBackend;
