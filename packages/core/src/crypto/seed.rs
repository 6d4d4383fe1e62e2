//! Entropy/Nonce Provisioning
//!
//! Подготовка seed material до instantiate:
//! - минимальная длина entropy для выбранного DRBG mode
//! - entropy (demo: нули, production: caller-supplied / OsRng)
//! - nonce по направлению канала
//!
//! Ошибки длины ловятся здесь, до instantiate. Entropy никогда не
//! дополняется и не обрезается.

use crate::config::Config;
use crate::crypto::provider::CapabilityBackend;
use crate::crypto::DrbgMode;
use crate::status::StatusCode;
use rand::rngs::OsRng;
use rand_core::RngCore;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Direction of travel within one conversation.
///
/// Each direction has its own nonce, so the upstream encoder/decoder pair and
/// the downstream pair derive different state from the same entropy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Initiator → responder
    Upstream,
    /// Responder → initiator
    Downstream,
}

impl Direction {
    pub fn nonce<'a>(&self, config: &'a Config) -> &'a str {
        match self {
            Direction::Upstream => &config.upstream_nonce,
            Direction::Downstream => &config.downstream_nonce,
        }
    }
}

/// Where entropy for a new seed comes from.
#[derive(Clone)]
pub enum SeedSource {
    /// All-zero entropy. Only accepted by a backend configured for demos.
    InsecureDemo,
    /// Caller-supplied entropy, shared with the peer out of band.
    Provided(Zeroizing<Vec<u8>>),
}

impl SeedSource {
    /// Pre-shared entropy if configured, else demo seeding if allowed.
    pub fn from_config(config: &Config) -> Option<Self> {
        match &config.shared_entropy {
            Some(bytes) => Some(SeedSource::Provided(Zeroizing::new(bytes.clone()))),
            None if config.insecure_demo_seeding => Some(SeedSource::InsecureDemo),
            None => None,
        }
    }
}

impl fmt::Debug for SeedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeedSource::InsecureDemo => f.write_str("InsecureDemo"),
            SeedSource::Provided(bytes) => write!(f, "Provided({} bytes)", bytes.len()),
        }
    }
}

/// Entropy + nonce, consumed once by `instantiate`.
///
/// Fields are private and wiped on drop; nothing outside the crate can read
/// them back.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SeedMaterial {
    entropy: Vec<u8>,
    nonce: Vec<u8>,
}

impl SeedMaterial {
    /// Builds seed material from caller-supplied parts.
    ///
    /// # Errors
    /// - `EntropyInsufficient` if `entropy` is shorter than `min_bytes`
    /// - `NonceInvalid` if `nonce` is empty
    pub fn from_parts(
        entropy: Vec<u8>,
        nonce: impl Into<Vec<u8>>,
        min_bytes: usize,
    ) -> Result<Self, StatusCode> {
        let seed = Self {
            entropy,
            nonce: nonce.into(),
        };
        if seed.entropy.len() < min_bytes {
            return Err(StatusCode::EntropyInsufficient);
        }
        if seed.nonce.is_empty() {
            return Err(StatusCode::NonceInvalid);
        }
        Ok(seed)
    }

    pub fn entropy_len(&self) -> usize {
        self.entropy.len()
    }

    /// True if every entropy byte is zero (an empty entropy counts as zero).
    pub fn is_all_zero(&self) -> bool {
        self.entropy.iter().all(|b| *b == 0)
    }

    pub(crate) fn entropy(&self) -> &[u8] {
        &self.entropy
    }

    pub(crate) fn nonce(&self) -> &[u8] {
        &self.nonce
    }
}

impl fmt::Debug for SeedMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeedMaterial")
            .field("entropy_len", &self.entropy.len())
            .field("nonce_len", &self.nonce.len())
            .finish()
    }
}

/// Minimum entropy length the backend requires for `drbg`.
pub fn min_entropy_bytes<B: CapabilityBackend + ?Sized>(backend: &B, drbg: DrbgMode) -> usize {
    backend.entropy_min_bytes(drbg)
}

/// Builds seed material of at least `min_bytes` entropy from `source`.
///
/// Demo seeding produces exactly `min_bytes` zero bytes. Provided entropy is
/// used as-is and must already be long enough.
pub fn build_seed(min_bytes: usize, source: &SeedSource, nonce: &[u8]) -> Result<SeedMaterial, StatusCode> {
    let entropy = match source {
        SeedSource::InsecureDemo => vec![0u8; min_bytes],
        SeedSource::Provided(bytes) => bytes.to_vec(),
    };
    SeedMaterial::from_parts(entropy, nonce, min_bytes)
}

/// Fresh random entropy from the OS RNG, for callers that share it with the
/// peer themselves.
pub fn generate_entropy(len: usize) -> Zeroizing<Vec<u8>> {
    let mut bytes = Zeroizing::new(vec![0u8; len]);
    OsRng.fill_bytes(bytes.as_mut_slice());
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_seed_has_exact_length() {
        let seed = build_seed(32, &SeedSource::InsecureDemo, b"1").unwrap();
        assert_eq!(seed.entropy_len(), 32);
        assert!(seed.is_all_zero());
        assert_eq!(seed.nonce(), b"1");
    }

    #[test]
    fn test_zero_minimum_gives_empty_entropy() {
        let seed = build_seed(0, &SeedSource::InsecureDemo, b"0").unwrap();
        assert_eq!(seed.entropy_len(), 0);
    }

    #[test]
    fn test_short_provided_entropy_is_rejected() {
        let source = SeedSource::Provided(Zeroizing::new(vec![9u8; 16]));
        let result = build_seed(32, &source, b"1");
        assert_eq!(result.unwrap_err(), StatusCode::EntropyInsufficient);
    }

    #[test]
    fn test_longer_entropy_is_kept_whole() {
        let source = SeedSource::Provided(generate_entropy(48));
        let seed = build_seed(32, &source, b"1").unwrap();
        assert_eq!(seed.entropy_len(), 48);
    }

    #[test]
    fn test_empty_nonce_is_rejected() {
        let result = SeedMaterial::from_parts(vec![1u8; 32], Vec::new(), 32);
        assert_eq!(result.unwrap_err(), StatusCode::NonceInvalid);
    }

    #[test]
    fn test_direction_nonces() {
        let config = Config::default();
        assert_eq!(Direction::Upstream.nonce(&config), "1");
        assert_eq!(Direction::Downstream.nonce(&config), "0");
    }

    #[test]
    fn test_debug_does_not_leak_entropy() {
        let seed = SeedMaterial::from_parts(vec![0xAB; 4], "1", 4).unwrap();
        let text = format!("{:?}", seed);
        assert!(!text.contains("171"));
        assert!(text.contains("entropy_len"));
    }

    #[test]
    fn test_source_from_config() {
        let mut config = Config::default();
        assert!(SeedSource::from_config(&config).is_none());

        config.insecure_demo_seeding = true;
        assert!(matches!(SeedSource::from_config(&config), Some(SeedSource::InsecureDemo)));

        config.shared_entropy = Some(vec![5u8; 32]);
        match SeedSource::from_config(&config) {
            Some(SeedSource::Provided(bytes)) => assert_eq!(bytes.len(), 32),
            other => panic!("unexpected source: {:?}", other),
        }
    }

    #[test]
    fn test_generated_entropy_is_not_zero() {
        let bytes = generate_entropy(32);
        assert!(bytes.iter().any(|b| *b != 0));
    }
}
