//! Status Registry
//!
//! Закрытый набор кодов результата для всех операций движка.
//! Каждому коду соответствует ровно один [`StatusDescriptor`] (имя + описание).
//!
//! Остальные модули сообщают об ошибках только через [`StatusCode`],
//! без произвольных строк.

use serde::Serialize;
use std::fmt;

/// Outcome of every engine operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StatusCode {
    Success,
    /// License/activation check failed; the backend refuses to instantiate anything.
    LicenseError,
    /// Entropy shorter than the DRBG minimum.
    EntropyInsufficient,
    /// All-zero entropy offered while insecure seeding is disabled.
    LowEntropyRejected,
    NonceInvalid,
    IdentifierInvalid,
    /// Operation on an engine that was never instantiated.
    NotInstantiated,
    /// Operation on a faulted engine, or a second instantiate.
    StateCorrupt,
    /// Input is not the paired encoder's next step (tampered, replayed, reordered).
    DecodeFailed,
    /// Input is not a well-formed envelope (bad base64, bad version, too short).
    InvalidEncoding,
    /// Plaintext does not fit the fixed-length frame.
    BufferTooSmall,
    /// Decoded bytes are not valid UTF-8 where text was requested.
    InvalidText,
}

/// Broad failure families, used to decide what the caller has to rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StatusFamily {
    Success,
    /// Fatal to the process' crypto capability, reported once at startup.
    Configuration,
    /// Fatal to the session being built; rebuild the seed and retry.
    Seeding,
    /// Fatal to the live session; re-establish with fresh seed material.
    Runtime,
}

/// Name/description pair for one [`StatusCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusDescriptor {
    pub code: StatusCode,
    pub name: &'static str,
    pub description: &'static str,
}

static REGISTRY: [StatusDescriptor; 12] = [
    StatusDescriptor {
        code: StatusCode::Success,
        name: "success",
        description: "The operation completed successfully.",
    },
    StatusDescriptor {
        code: StatusCode::LicenseError,
        name: "license_error",
        description: "The license company/key pair was not accepted by the backend.",
    },
    StatusDescriptor {
        code: StatusCode::EntropyInsufficient,
        name: "entropy_insufficient",
        description: "The entropy input is shorter than the DRBG minimum.",
    },
    StatusDescriptor {
        code: StatusCode::LowEntropyRejected,
        name: "low_entropy_rejected",
        description: "All-zero entropy is only accepted in insecure demo mode.",
    },
    StatusDescriptor {
        code: StatusCode::NonceInvalid,
        name: "nonce_invalid",
        description: "The nonce is empty or malformed.",
    },
    StatusDescriptor {
        code: StatusCode::IdentifierInvalid,
        name: "identifier_invalid",
        description: "The engine identifier is empty.",
    },
    StatusDescriptor {
        code: StatusCode::NotInstantiated,
        name: "not_instantiated",
        description: "The engine has not been instantiated.",
    },
    StatusDescriptor {
        code: StatusCode::StateCorrupt,
        name: "state_corrupt",
        description: "The engine is faulted and must be discarded.",
    },
    StatusDescriptor {
        code: StatusCode::DecodeFailed,
        name: "decode_failed",
        description: "The input is not the next message expected from the paired encoder.",
    },
    StatusDescriptor {
        code: StatusCode::InvalidEncoding,
        name: "invalid_encoding",
        description: "The input is not a well-formed encoded message.",
    },
    StatusDescriptor {
        code: StatusCode::BufferTooSmall,
        name: "buffer_too_small",
        description: "The plaintext does not fit the fixed-length frame.",
    },
    StatusDescriptor {
        code: StatusCode::InvalidText,
        name: "invalid_text",
        description: "The decoded payload is not valid UTF-8 text.",
    },
];

/// Look up the descriptor for `code`.
pub fn describe(code: StatusCode) -> &'static StatusDescriptor {
    // Таблица упорядочена так же, как варианты enum
    &REGISTRY[code as usize]
}

/// All descriptors, in declaration order.
pub fn registry() -> &'static [StatusDescriptor] {
    &REGISTRY
}

impl StatusCode {
    pub fn name(self) -> &'static str {
        describe(self).name
    }

    pub fn description(self) -> &'static str {
        describe(self).description
    }

    pub fn is_success(self) -> bool {
        self == StatusCode::Success
    }

    pub fn family(self) -> StatusFamily {
        match self {
            StatusCode::Success => StatusFamily::Success,
            StatusCode::LicenseError => StatusFamily::Configuration,
            StatusCode::EntropyInsufficient
            | StatusCode::LowEntropyRejected
            | StatusCode::NonceInvalid
            | StatusCode::IdentifierInvalid => StatusFamily::Seeding,
            StatusCode::NotInstantiated
            | StatusCode::StateCorrupt
            | StatusCode::DecodeFailed
            | StatusCode::InvalidEncoding
            | StatusCode::BufferTooSmall
            | StatusCode::InvalidText => StatusFamily::Runtime,
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.name(), self.description())
    }
}
