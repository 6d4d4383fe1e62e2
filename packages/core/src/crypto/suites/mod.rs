//! Реализации CapabilityBackend
//!
//! ## Доступные наборы
//!
//! ### Standard
//! - **KDF**: HKDF-SHA256 / HKDF-SHA512 (по DRBG mode)
//! - **AEAD**: ChaCha20-Poly1305
//! - **Лицензия**: activation code = SHA-256(company), первые 8 байт в hex
//!
//! ```rust,ignore
//! use sealchannel_core::config::Config;
//! use sealchannel_core::crypto::suites::standard::StandardBackend;
//!
//! let config = Config::global();
//! let mut backend = StandardBackend::load(config);
//! backend.init_license(&config.license_company, &config.license_key);
//! let backend = std::sync::Arc::new(backend);
//! ```

pub mod standard;
