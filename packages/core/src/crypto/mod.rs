//! Криптографический модуль
//!
//! # Архитектура
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Exchange (state::exchange)                 │
//! │  - Seeding → EncodersReady → AwaitingPeer → Complete        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                ┌─────────────┴─────────────┐
//!                ▼                           ▼
//! ┌───────────────────────────┐  ┌──────────────────────────┐
//! │   Encoder (engine)        │  │  Decoder (engine)        │
//! │  - instantiate(id, seed)  │  │  - instantiate(id, seed) │
//! │  - encode → next step     │  │  - decode ← next step    │
//! └───────────────────────────┘  └──────────────────────────┘
//!                │                           │
//!                └─────────────┬─────────────┘
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              CapabilityBackend (provider)                   │
//! │  - entropy minimum per DRBG mode                            │
//! │  - license status                                           │
//! │  - root / step derivation (HKDF)                            │
//! │  - seal / open (ChaCha20-Poly1305)                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Модули
//! - [`provider`]: CapabilityBackend trait
//! - [`suites`]: реализации backend (Standard)
//! - [`seed`]: entropy/nonce provisioning
//! - [`engine`]: Encoder / Decoder state machines

pub mod engine;
pub mod provider;
pub mod seed;
pub mod suites;

pub use engine::{
    open_decoder, open_encoder, Decoder, Encoder, EngineIdentity, EngineKind, EngineState,
    ExchangeResult,
};
pub use provider::CapabilityBackend;
pub use seed::{build_seed, min_entropy_bytes, Direction, SeedMaterial, SeedSource};

/// Randomness/derivation mode a session is seeded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrbgMode {
    /// No entropy input; state is derived from nonce and identifier alone.
    Unseeded,
    /// HKDF-SHA256 based derivation
    HashSha256,
    /// HKDF-SHA512 based derivation
    HashSha512,
}

impl DrbgMode {
    pub fn name(self) -> &'static str {
        match self {
            DrbgMode::Unseeded => "unseeded",
            DrbgMode::HashSha256 => "hash-sha256",
            DrbgMode::HashSha512 => "hash-sha512",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "unseeded" | "none" => Some(DrbgMode::Unseeded),
            "hash-sha256" | "sha256" => Some(DrbgMode::HashSha256),
            "hash-sha512" | "sha512" => Some(DrbgMode::HashSha512),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drbg_names_round_trip() {
        for mode in [DrbgMode::Unseeded, DrbgMode::HashSha256, DrbgMode::HashSha512] {
            assert_eq!(DrbgMode::from_name(mode.name()), Some(mode));
        }
        assert_eq!(DrbgMode::from_name(" SHA512 "), Some(DrbgMode::HashSha512));
        assert_eq!(DrbgMode::from_name("ctr-aes"), None);
    }
}
