//! Session Engine
//!
//! Пара независимых state machines: [`Encoder`] и [`Decoder`].
//!
//! ```text
//! Uninstantiated ──instantiate ok──▶ Ready ──encode/decode ok──▶ Ready
//!       │                              │
//!       └──instantiate failed──▶ Faulted ◀──transform failed──┘
//! ```
//!
//! ## Протокол
//!
//! Каждый шаг выводит `(step keys, next chain key)` из текущего chain key.
//! Номер шага, epoch и identifier входят в associated data, поэтому вывод
//! шага *n* открывается только ключами шага *n* у парного decoder:
//! reorder, replay и подмена дают `DecodeFailed`.
//!
//! Epoch нумерует setup'ы одного обмена и входит в root derivation:
//! повторный setup с тем же seed даёт новую цепочку ключей.
//!
//! Encoder и decoder одного направления должны быть созданы с одинаковыми
//! entropy, nonce, identifier и epoch и получать вызовы в одном и том же порядке.
//!
//! ## Инварианты
//! - state только продвигается вперёд; "reset" = новая сессия с новым seed
//! - faulted сессия отклоняет все операции (`StateCorrupt`) и не меняется
//! - пустое сообщение продвигает state так же, как непустое
//! - seed material не хранится после instantiate

mod decoder;
mod encoder;

pub use decoder::Decoder;
pub use encoder::Encoder;

use crate::config::Config;
use crate::crypto::provider::{CapabilityBackend, ChainKey, StepKeys};
use crate::crypto::seed::{build_seed, min_entropy_bytes, Direction, SeedMaterial, SeedSource};
use crate::crypto::DrbgMode;
use crate::error::EngineError;
use crate::protocol::wire::{self, FrameMode};
use crate::status::StatusCode;
use std::sync::Arc;
use tracing::{debug, warn};

/// Longest accepted identifier, in bytes.
pub const MAX_IDENTIFIER_LEN: usize = 256;

/// Output shape of an encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    /// Frame sized to the plaintext.
    Core,
    /// Every frame padded to the given number of plaintext bytes.
    FixedLength(usize),
    /// Frame sealed under a fresh random key, wrapped with the step key.
    ManagedKey,
}

impl EngineKind {
    pub fn fixed_length(self) -> Option<usize> {
        match self {
            EngineKind::FixedLength(len) => Some(len),
            EngineKind::Core | EngineKind::ManagedKey => None,
        }
    }

    pub fn frame_mode(self) -> FrameMode {
        match self {
            EngineKind::ManagedKey => FrameMode::ManagedKey,
            EngineKind::Core | EngineKind::FixedLength(_) => FrameMode::Direct,
        }
    }
}

/// Label binding a session to a logical peer/channel and to one setup of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineIdentity {
    identifier: String,
    epoch: u32,
}

impl EngineIdentity {
    /// Identity at epoch 0.
    pub fn new(identifier: impl Into<String>) -> Result<Self, StatusCode> {
        let identifier = identifier.into();
        if identifier.is_empty() || identifier.len() > MAX_IDENTIFIER_LEN {
            return Err(StatusCode::IdentifierInvalid);
        }
        Ok(Self { identifier, epoch: 0 })
    }

    pub fn with_epoch(mut self, epoch: u32) -> Self {
        self.epoch = epoch;
        self
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn epoch(&self) -> u32 {
        self.epoch
    }
}

/// Lifecycle state of one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninstantiated,
    Ready,
    /// Faulted with the status that caused it.
    Faulted(StatusCode),
}

/// Result of an encode/decode call. `payload` is set only on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeResult<T> {
    status: StatusCode,
    payload: Option<T>,
}

impl<T> ExchangeResult<T> {
    pub fn success(payload: T) -> Self {
        Self {
            status: StatusCode::Success,
            payload: Some(payload),
        }
    }

    pub fn failure(status: StatusCode) -> Self {
        debug_assert!(!status.is_success());
        Self {
            status,
            payload: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn payload(&self) -> Option<&T> {
        self.payload.as_ref()
    }

    pub fn into_payload(self) -> Option<T> {
        self.payload
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ExchangeResult<U> {
        ExchangeResult {
            status: self.status,
            payload: self.payload.map(f),
        }
    }

    pub fn into_status_result(self) -> Result<T, StatusCode> {
        match (self.status, self.payload) {
            (StatusCode::Success, Some(payload)) => Ok(payload),
            (StatusCode::Success, None) => Err(StatusCode::StateCorrupt),
            (status, _) => Err(status),
        }
    }

    pub fn into_result(self) -> Result<T, EngineError> {
        self.into_status_result().map_err(EngineError)
    }
}

impl<T> From<Result<T, StatusCode>> for ExchangeResult<T> {
    fn from(result: Result<T, StatusCode>) -> Self {
        match result {
            Ok(payload) => Self::success(payload),
            Err(status) => Self::failure(status),
        }
    }
}

fn seed_for<B: CapabilityBackend + ?Sized>(
    backend: &B,
    config: &Config,
    direction: Direction,
    epoch: u32,
    source: &SeedSource,
) -> Result<(EngineIdentity, SeedMaterial), StatusCode> {
    let identity = EngineIdentity::new(config.identifier.as_str())?.with_epoch(epoch);
    let min_bytes = min_entropy_bytes(backend, config.drbg);
    let seed = build_seed(min_bytes, source, direction.nonce(config).as_bytes())?;
    Ok((identity, seed))
}

/// Build and instantiate the encoder for `direction` and `epoch` as described by `config`.
pub fn open_encoder<B: CapabilityBackend + ?Sized>(
    backend: &Arc<B>,
    config: &Config,
    direction: Direction,
    epoch: u32,
    source: &SeedSource,
) -> Result<Encoder<B>, StatusCode> {
    let (identity, seed) = seed_for(backend.as_ref(), config, direction, epoch, source)?;
    let mut encoder = Encoder::with_kind(Arc::clone(backend), config.drbg, config.engine_kind());
    match encoder.instantiate(identity, seed) {
        StatusCode::Success => Ok(encoder),
        status => Err(status),
    }
}

/// Build and instantiate the decoder for `direction` and `epoch` as described by `config`.
///
/// The decoder accepts every frame mode; the mode is authenticated per message.
pub fn open_decoder<B: CapabilityBackend + ?Sized>(
    backend: &Arc<B>,
    config: &Config,
    direction: Direction,
    epoch: u32,
    source: &SeedSource,
) -> Result<Decoder<B>, StatusCode> {
    let (identity, seed) = seed_for(backend.as_ref(), config, direction, epoch, source)?;
    let mut decoder = Decoder::new(Arc::clone(backend), config.drbg);
    match decoder.instantiate(identity, seed) {
        StatusCode::Success => Ok(decoder),
        status => Err(status),
    }
}

/// Keys for the next step, not yet committed.
pub(crate) struct PendingStep {
    pub keys: StepKeys,
    pub next_chain: ChainKey,
    pub associated_data: Vec<u8>,
}

/// State shared by Encoder and Decoder.
pub(crate) struct SessionCore<B: CapabilityBackend + ?Sized> {
    backend: Arc<B>,
    drbg: DrbgMode,
    state: EngineState,
    chain_key: Option<ChainKey>,
    step: u64,
    identity: Option<EngineIdentity>,
    session_id: String,
    role: &'static str,
}

impl<B: CapabilityBackend + ?Sized> SessionCore<B> {
    pub fn new(backend: Arc<B>, drbg: DrbgMode, role: &'static str) -> Self {
        Self {
            backend,
            drbg,
            state: EngineState::Uninstantiated,
            chain_key: None,
            step: 0,
            identity: None,
            session_id: uuid::Uuid::new_v4().to_string(),
            role,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn drbg(&self) -> DrbgMode {
        self.drbg
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn identity(&self) -> Option<&EngineIdentity> {
        self.identity.as_ref()
    }

    /// Epoch of the bound identity; 0 before instantiate.
    pub fn epoch(&self) -> u32 {
        self.identity.as_ref().map_or(0, EngineIdentity::epoch)
    }

    /// Bind identity and seed. The seed is dropped (and wiped) on return.
    pub fn instantiate(&mut self, identity: EngineIdentity, seed: SeedMaterial) -> StatusCode {
        if self.state != EngineState::Uninstantiated {
            warn!(
                target: "engine",
                role = self.role,
                session_id = %self.session_id,
                "instantiate called twice"
            );
            return StatusCode::StateCorrupt;
        }

        match self.derive_root(&identity, &seed) {
            Ok(chain_key) => {
                debug!(
                    target: "engine",
                    role = self.role,
                    session_id = %self.session_id,
                    identifier = %identity.identifier(),
                    epoch = identity.epoch(),
                    drbg = self.drbg.name(),
                    "Engine instantiated"
                );
                self.chain_key = Some(chain_key);
                self.identity = Some(identity);
                self.state = EngineState::Ready;
                StatusCode::Success
            }
            Err(status) => {
                warn!(
                    target: "engine",
                    role = self.role,
                    session_id = %self.session_id,
                    status = status.name(),
                    "Engine instantiation failed"
                );
                self.state = EngineState::Faulted(status);
                status
            }
        }
    }

    fn derive_root(&self, identity: &EngineIdentity, seed: &SeedMaterial) -> Result<ChainKey, StatusCode> {
        let license = self.backend.license_status();
        if !license.is_success() {
            return Err(license);
        }
        if seed.entropy_len() < self.backend.entropy_min_bytes(self.drbg) {
            return Err(StatusCode::EntropyInsufficient);
        }
        if seed.nonce().is_empty() {
            return Err(StatusCode::NonceInvalid);
        }
        if seed.is_all_zero() && !self.backend.allows_insecure_seeding() {
            return Err(StatusCode::LowEntropyRejected);
        }

        self.backend
            .derive_root(
                self.drbg,
                identity.identifier().as_bytes(),
                identity.epoch(),
                seed.entropy(),
                seed.nonce(),
            )
            .map_err(|e| {
                warn!(target: "engine", error = %e, "Root derivation failed");
                StatusCode::StateCorrupt
            })
    }

    /// Ok only in `Ready`. Never mutates.
    pub fn guard(&self) -> Result<(), StatusCode> {
        match self.state {
            EngineState::Ready => Ok(()),
            EngineState::Uninstantiated => Err(StatusCode::NotInstantiated),
            EngineState::Faulted(_) => Err(StatusCode::StateCorrupt),
        }
    }

    /// Derive the next step's keys without touching state.
    pub fn prepare_step(&self, mode: FrameMode) -> Result<PendingStep, StatusCode> {
        self.guard()?;
        let (chain_key, identity) = match (&self.chain_key, &self.identity) {
            (Some(chain_key), Some(identity)) => (chain_key, identity),
            _ => return Err(StatusCode::StateCorrupt),
        };

        let (keys, next_chain) = self.backend.kdf_step(self.drbg, chain_key).map_err(|e| {
            warn!(target: "engine", error = %e, "Step derivation failed");
            StatusCode::StateCorrupt
        })?;

        Ok(PendingStep {
            keys,
            next_chain,
            associated_data: wire::associated_data(identity.identifier(), identity.epoch(), mode, self.step),
        })
    }

    pub fn commit(&mut self, next_chain: ChainKey) {
        self.chain_key = Some(next_chain);
        self.step += 1;
    }

    /// Move to `Faulted` and drop key material. Sessions are not self-healing.
    pub fn fault(&mut self, status: StatusCode) {
        warn!(
            target: "engine",
            role = self.role,
            session_id = %self.session_id,
            step = self.step,
            status = status.name(),
            "Engine faulted"
        );
        self.state = EngineState::Faulted(status);
        self.chain_key = None;
    }
}
