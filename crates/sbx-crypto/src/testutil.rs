//! Shared test identities; RSA key generation is too slow to repeat per test.

use std::sync::OnceLock;

use crate::identity::{generate_identity, IdentityKeyPair};

pub(crate) fn alice() -> &'static IdentityKeyPair {
    static ALICE: OnceLock<IdentityKeyPair> = OnceLock::new();
    ALICE.get_or_init(|| generate_identity().expect("generate alice"))
}

pub(crate) fn bob() -> &'static IdentityKeyPair {
    static BOB: OnceLock<IdentityKeyPair> = OnceLock::new();
    BOB.get_or_init(|| generate_identity().expect("generate bob"))
}
