//! Конфигурация Sealchannel Core
//!
//! Параметры сессии (identifier, DRBG mode, nonces), лицензии и транспорта.
//! Обе стороны обмена должны использовать одинаковые параметры сессии.

use crate::crypto::{DrbgMode, EngineKind};
use crate::error::ExchangeError;
use crate::protocol::wire::MAX_FIXED_LENGTH;
use std::str::FromStr;
use std::sync::OnceLock;

static GLOBAL_CONFIG: OnceLock<Config> = OnceLock::new();

/// Session, license and transport settings
#[derive(Debug, Clone)]
pub struct Config {
    // ---- сессия ----
    /// Identifier both sides instantiate their engines under
    pub identifier: String,

    /// DRBG mode used to derive session state
    pub drbg: DrbgMode,

    /// Accept all-zero entropy. Demo only: a production backend rejects it.
    pub insecure_demo_seeding: bool,

    /// Pre-shared entropy for both directions (takes precedence over demo seeding)
    pub shared_entropy: Option<Vec<u8>>,

    /// Nonce for the initiator → responder direction
    pub upstream_nonce: String,

    /// Nonce for the responder → initiator direction
    pub downstream_nonce: String,

    /// Pad every plaintext frame to this many bytes (fixed-length mode)
    pub fixed_length: Option<usize>,

    /// Seal every message under a fresh random key wrapped with the step key
    pub managed_key: bool,

    // ---- лицензия ----
    pub license_company: String,

    pub license_key: String,

    // ---- транспорт (echo peer) ----
    pub host: String,

    pub port: u16,

    /// Path of the echo endpoint, fixed per deployment
    pub path: String,

    /// Timeout for one request/response exchange (в миллисекундах)
    pub transport_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Сессия
            identifier: "demo".to_string(),
            drbg: DrbgMode::HashSha256,
            insecure_demo_seeding: false,
            shared_entropy: None,
            upstream_nonce: "1".to_string(),
            downstream_nonce: "0".to_string(),
            fixed_length: None,
            managed_key: false,

            // Лицензия
            license_company: "Demo Company".to_string(),
            license_key: "07c80654a2ec21c8".to_string(),

            // Сеть
            host: "localhost".to_string(),
            port: 27015,
            path: "/echo".to_string(),
            transport_timeout_ms: 10_000,
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env_var(name).and_then(|v| v.trim().parse().ok())
}

fn env_flag(name: &str) -> Option<bool> {
    env_var(name).map(|v| matches!(v.trim(), "1" | "true" | "yes"))
}

/// Fixed frame length from text; values above [`MAX_FIXED_LENGTH`] are refused.
pub fn parse_fixed_length(value: &str) -> Option<usize> {
    value
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|len| *len <= MAX_FIXED_LENGTH)
}

impl Config {
    /// Defaults overridden by `SEALCHANNEL_*` variables. Unparseable values
    /// are ignored.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            identifier: env_var("SEALCHANNEL_IDENTIFIER").unwrap_or(defaults.identifier),
            drbg: env_var("SEALCHANNEL_DRBG")
                .and_then(|v| DrbgMode::from_name(&v))
                .unwrap_or(defaults.drbg),
            insecure_demo_seeding: env_flag("SEALCHANNEL_INSECURE_DEMO")
                .unwrap_or(defaults.insecure_demo_seeding),
            shared_entropy: env_var("SEALCHANNEL_ENTROPY_HEX")
                .and_then(|v| hex::decode(v.trim()).ok())
                .or(defaults.shared_entropy),
            upstream_nonce: defaults.upstream_nonce,
            downstream_nonce: defaults.downstream_nonce,
            fixed_length: env_var("SEALCHANNEL_FIXED_LENGTH")
                .and_then(|v| parse_fixed_length(&v))
                .or(defaults.fixed_length),
            managed_key: env_flag("SEALCHANNEL_MANAGED_KEY").unwrap_or(defaults.managed_key),
            license_company: env_var("SEALCHANNEL_LICENSE_COMPANY")
                .unwrap_or(defaults.license_company),
            license_key: env_var("SEALCHANNEL_LICENSE_KEY").unwrap_or(defaults.license_key),
            host: env_var("SEALCHANNEL_HOST").unwrap_or(defaults.host),
            port: env_parse("SEALCHANNEL_PORT").unwrap_or(defaults.port),
            path: defaults.path,
            transport_timeout_ms: env_parse("SEALCHANNEL_TIMEOUT_MS")
                .unwrap_or(defaults.transport_timeout_ms),
        }
    }

    /// Encoder output shape. Managed-key mode wins over a fixed length.
    pub fn engine_kind(&self) -> EngineKind {
        match (self.managed_key, self.fixed_length) {
            (true, _) => EngineKind::ManagedKey,
            (false, Some(len)) => EngineKind::FixedLength(len),
            (false, None) => EngineKind::Core,
        }
    }

    /// Full URL of the echo endpoint, e.g. `http://localhost:27015/echo`
    pub fn peer_url(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, self.path)
    }

    /// Процессный экземпляр; без явной инициализации берутся значения по умолчанию
    pub fn global() -> &'static Config {
        GLOBAL_CONFIG.get_or_init(Config::default)
    }

    /// Установить процессный экземпляр. Только один раз, до первого `global()`.
    pub fn init_with(config: Config) -> Result<(), ExchangeError> {
        GLOBAL_CONFIG
            .set(config)
            .map_err(|_| ExchangeError::Config("configuration already initialized".to_string()))
    }
}
