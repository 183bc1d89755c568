//! Identity key pairs: RSA-2048 / OAEP-SHA256, SPKI and PKCS#8 export

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::handle::{KeyAlgorithm, KeyFormat, KeyHandle};
use crate::{RSA_MODULUS_BITS, RSA_PUBLIC_EXPONENT};

/// The public half of an identity, as published in the backend's key directory.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(RsaPublicKey);

impl PublicKey {
    /// Parse an SPKI DER public key.
    ///
    /// Public keys always come from the untrusted key directory, so any parse
    /// failure (or a modulus smaller than an identity key's) is reported as
    /// `InvalidRecipientKey`.
    pub fn from_spki_der(der: &[u8]) -> Result<Self, CryptoError> {
        let key = RsaPublicKey::from_public_key_der(der)
            .map_err(|e| CryptoError::InvalidRecipientKey(format!("SPKI decode: {e}")))?;
        let bits = key.size() * 8;
        if bits < RSA_MODULUS_BITS {
            return Err(CryptoError::InvalidRecipientKey(format!(
                "RSA modulus too small: {bits} bits (expected at least {RSA_MODULUS_BITS})"
            )));
        }
        Ok(Self(key))
    }

    /// Parse the base64 SPKI text used on the wire.
    pub fn from_base64(text: &str) -> Result<Self, CryptoError> {
        let der = STANDARD
            .decode(text.trim())
            .map_err(|e| CryptoError::InvalidRecipientKey(format!("base64 decode: {e}")))?;
        Self::from_spki_der(&der)
    }

    pub fn to_spki_der(&self) -> Result<Vec<u8>, CryptoError> {
        self.0
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| CryptoError::Primitive(format!("SPKI encode: {e}")))
    }

    pub fn to_base64(&self) -> Result<String, CryptoError> {
        Ok(STANDARD.encode(self.to_spki_der()?))
    }

    pub(crate) fn rsa(&self) -> &RsaPublicKey {
        &self.0
    }
}

impl KeyHandle for PublicKey {
    fn algorithm(&self) -> KeyAlgorithm {
        KeyAlgorithm::RsaOaepSha256
    }

    fn format(&self) -> KeyFormat {
        KeyFormat::Spki
    }

    fn export(&self) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        self.to_spki_der().map(Zeroizing::new)
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicKey")
            .field("bits", &(self.0.size() * 8))
            .finish()
    }
}

/// The private half of an identity. Only ever held by the local key store
/// and, transiently, by a running transfer pipeline.
#[derive(Clone)]
pub struct PrivateKey(RsaPrivateKey);

impl PrivateKey {
    /// Parse a PKCS#8 DER private key (the backup artifact format).
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self, CryptoError> {
        let key = RsaPrivateKey::from_pkcs8_der(der)
            .map_err(|e| CryptoError::MalformedKeyMaterial(format!("PKCS#8 decode: {e}")))?;
        key.validate()
            .map_err(|e| CryptoError::MalformedKeyMaterial(format!("RSA key validation: {e}")))?;
        Ok(Self(key))
    }

    pub fn to_pkcs8_der(&self) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        self.0
            .to_pkcs8_der()
            .map(|doc| doc.to_bytes())
            .map_err(|e| CryptoError::Primitive(format!("PKCS#8 encode: {e}")))
    }

    pub fn public(&self) -> PublicKey {
        PublicKey(self.0.to_public_key())
    }

    pub(crate) fn rsa(&self) -> &RsaPrivateKey {
        &self.0
    }
}

impl KeyHandle for PrivateKey {
    fn algorithm(&self) -> KeyAlgorithm {
        KeyAlgorithm::RsaOaepSha256
    }

    fn format(&self) -> KeyFormat {
        KeyFormat::Pkcs8
    }

    fn export(&self) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        self.to_pkcs8_der()
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// A user's long-lived identity, generated once at registration.
#[derive(Debug, Clone)]
pub struct IdentityKeyPair {
    pub public: PublicKey,
    pub private: PrivateKey,
}

/// Generate a new RSA-2048 identity (public exponent 65537) for OAEP-SHA256.
///
/// This is slow (tens to hundreds of milliseconds); async callers should run
/// it on a blocking thread.
pub fn generate_identity() -> Result<IdentityKeyPair, CryptoError> {
    let exponent = BigUint::from(RSA_PUBLIC_EXPONENT);
    let private = RsaPrivateKey::new_with_exp(&mut OsRng, RSA_MODULUS_BITS, &exponent)
        .map_err(|e| CryptoError::Primitive(format!("RSA key generation: {e}")))?;
    let public = private.to_public_key();
    tracing::debug!(bits = RSA_MODULUS_BITS, "generated identity key pair");
    Ok(IdentityKeyPair {
        public: PublicKey(public),
        private: PrivateKey(private),
    })
}

/// SPKI DER encoding of the identity's public key.
pub fn export_public(keypair: &IdentityKeyPair) -> Result<Vec<u8>, CryptoError> {
    keypair.public.to_spki_der()
}

/// PKCS#8 DER encoding of the identity's private key, for the user's backup.
///
/// This is the only copy of the private key that exists outside the local
/// key store. Losing both makes every file the user holds unreadable.
pub fn export_private(keypair: &IdentityKeyPair) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    keypair.private.to_pkcs8_der()
}
