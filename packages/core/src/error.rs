// Типы ошибок

use crate::state::exchange::ExchangePhase;
use crate::status::StatusCode;
use thiserror::Error;

/// Errors raised inside a capability backend.
///
/// These never leave the engine as-is: the engine maps them onto a
/// [`StatusCode`] before returning.
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Key derivation failed: {0}")]
    KeyDerivationError(String),
    #[error("AEAD encryption failed: {0}")]
    AeadEncryptionError(String),
    #[error("AEAD decryption failed")]
    AeadDecryptionError,
    #[error("Invalid input: {0}")]
    InvalidInputError(String),
}

impl From<hkdf::InvalidLength> for CryptoError {
    fn from(err: hkdf::InvalidLength) -> Self {
        CryptoError::KeyDerivationError(err.to_string())
    }
}

/// A failed engine operation, carrying its registry status.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{} ({})", .0.name(), .0.description())]
pub struct EngineError(pub StatusCode);

impl EngineError {
    pub fn status(&self) -> StatusCode {
        self.0
    }
}

impl From<StatusCode> for EngineError {
    fn from(code: StatusCode) -> Self {
        EngineError(code)
    }
}

/// Transport collaborator failure. Transport-level detail stays here; the
/// engine never sees it.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Peer answered with HTTP status {0}")]
    Status(u16),
    #[error("Failed to read response body: {0}")]
    Body(String),
    #[error("Peer rejected the request: {0}")]
    Rejected(StatusCode),
}

/// Errors surfaced by the exchange orchestrator.
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("Session error: {0}")]
    Engine(#[from] EngineError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Operation not allowed in phase {0:?}")]
    InvalidState(ExchangePhase),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ExchangeError {
    /// Status code behind the error, if it came from the engine.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ExchangeError::Engine(e) => Some(e.status()),
            ExchangeError::Transport(TransportError::Rejected(code)) => Some(*code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ExchangeError>;
