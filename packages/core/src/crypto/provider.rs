//! Defines the CapabilityBackend trait consumed by the session engine.

use crate::crypto::DrbgMode;
use crate::error::CryptoError;
use crate::status::StatusCode;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Chain key carried between steps of one session.
pub type ChainKey = Zeroizing<Vec<u8>>;

/// Key material for exactly one encode/decode step.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct StepKeys {
    pub key: Vec<u8>,
    pub nonce: Vec<u8>,
}

/// Capability backend: everything cryptographic the engine needs, injected.
///
/// The engine never reimplements any of this. A backend is shared by many
/// sessions (`Arc<B>`) and is read-only once its license has been checked.
pub trait CapabilityBackend: Send + Sync + 'static {
    /// Minimum entropy input length for `drbg`. May be zero.
    fn entropy_min_bytes(&self, drbg: DrbgMode) -> usize;

    /// Result of the license/activation check done at startup.
    fn license_status(&self) -> StatusCode;

    /// Whether all-zero entropy is acceptable (demo deployments only).
    fn allows_insecure_seeding(&self) -> bool;

    /// Bytes the seal operation adds on top of the plaintext.
    fn overhead(&self) -> usize;

    /// Length of a symmetric key, including one-time message keys.
    fn key_len(&self) -> usize;

    /// Derives the initial chain key from seed material and identity.
    ///
    /// `epoch` numbers the setups of one exchange; each epoch yields an
    /// unrelated chain even when the rest of the seed repeats.
    fn derive_root(
        &self,
        drbg: DrbgMode,
        identifier: &[u8],
        epoch: u32,
        entropy: &[u8],
        nonce: &[u8],
    ) -> Result<ChainKey, CryptoError>;

    /// Derives the keys for the current step and the next chain key.
    fn kdf_step(&self, drbg: DrbgMode, chain_key: &[u8]) -> Result<(StepKeys, ChainKey), CryptoError>;

    /// Fresh random key for a single managed-key message.
    fn random_message_key(&self) -> Zeroizing<Vec<u8>>;

    /// Seal/open keys for a one-time message key. Never reuse `message_key`.
    fn message_keys(&self, message_key: &[u8]) -> Result<StepKeys, CryptoError>;

    /// Seals `plaintext` with the step keys, authenticating `associated_data`.
    fn seal(
        &self,
        keys: &StepKeys,
        plaintext: &[u8],
        associated_data: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;

    /// Opens a sealed payload. Any mismatch is an error; no partial output.
    fn open(
        &self,
        keys: &StepKeys,
        sealed: &[u8],
        associated_data: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;
}
