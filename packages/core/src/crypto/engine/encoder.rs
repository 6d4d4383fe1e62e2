use super::{EngineIdentity, EngineKind, EngineState, ExchangeResult, PendingStep, SessionCore};
use crate::crypto::provider::CapabilityBackend;
use crate::crypto::seed::SeedMaterial;
use crate::crypto::DrbgMode;
use crate::error::CryptoError;
use crate::protocol::wire::{self, FrameMode};
use crate::status::StatusCode;
use crate::utils::b64;
use std::sync::Arc;
use tracing::{trace, warn};

/// Sending half of a session: plaintext → opaque envelope.
pub struct Encoder<B: CapabilityBackend + ?Sized> {
    core: SessionCore<B>,
    kind: EngineKind,
}

impl<B: CapabilityBackend + ?Sized> Encoder<B> {
    pub fn new(backend: Arc<B>, drbg: DrbgMode) -> Self {
        Self::with_kind(backend, drbg, EngineKind::Core)
    }

    pub fn with_kind(backend: Arc<B>, drbg: DrbgMode, kind: EngineKind) -> Self {
        Self {
            core: SessionCore::new(backend, drbg, "encoder"),
            kind,
        }
    }

    /// `Uninstantiated → Ready`, or `Faulted` with the returned status.
    pub fn instantiate(&mut self, identity: EngineIdentity, seed: SeedMaterial) -> StatusCode {
        self.core.instantiate(identity, seed)
    }

    /// Encode one message and advance the session by one step.
    ///
    /// The output opens only as the paired decoder's next step. A plaintext
    /// that does not fit a fixed-length frame is refused without advancing.
    pub fn encode(&mut self, plaintext: &[u8]) -> ExchangeResult<Vec<u8>> {
        if let Err(status) = self.core.guard() {
            return ExchangeResult::failure(status);
        }

        let frame = match wire::frame_plaintext(plaintext, self.kind.fixed_length()) {
            Ok(frame) => frame,
            Err(status) => {
                warn!(
                    target: "engine::encoder",
                    session_id = %self.core.session_id(),
                    plaintext_len = plaintext.len(),
                    status = status.name(),
                    "Plaintext rejected"
                );
                return ExchangeResult::failure(status);
            }
        };

        let mode = self.kind.frame_mode();
        let pending = match self.core.prepare_step(mode) {
            Ok(pending) => pending,
            Err(status) => {
                self.core.fault(status);
                return ExchangeResult::failure(status);
            }
        };

        let sealed = match self.seal_frame(&pending, mode, &frame) {
            Ok(sealed) => sealed,
            Err(e) => {
                warn!(target: "engine::encoder", error = %e, "Seal failed");
                self.core.fault(StatusCode::StateCorrupt);
                return ExchangeResult::failure(StatusCode::StateCorrupt);
            }
        };

        trace!(
            target: "engine::encoder",
            session_id = %self.core.session_id(),
            step = self.core.step(),
            plaintext_len = plaintext.len(),
            sealed_len = sealed.len(),
            "Message encoded"
        );

        let epoch = self.core.epoch();
        self.core.commit(pending.next_chain);
        ExchangeResult::success(wire::pack_envelope(mode, epoch, &sealed))
    }

    fn seal_frame(&self, pending: &PendingStep, mode: FrameMode, frame: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let backend = self.core.backend();
        let aad = &pending.associated_data;
        match mode {
            FrameMode::Direct => backend.seal(&pending.keys, frame, aad),
            FrameMode::ManagedKey => {
                let message_key = backend.random_message_key();
                let mut sealed = backend.seal(&pending.keys, &message_key, aad)?;
                let message_keys = backend.message_keys(&message_key)?;
                sealed.extend_from_slice(&backend.seal(&message_keys, frame, aad)?);
                Ok(sealed)
            }
        }
    }

    pub fn encode_str(&mut self, plaintext: &str) -> ExchangeResult<Vec<u8>> {
        self.encode(plaintext.as_bytes())
    }

    /// Encode and return the envelope as base64 text, ready for a text body.
    pub fn encode_b64(&mut self, plaintext: &str) -> ExchangeResult<String> {
        self.encode_str(plaintext).map(|bytes| b64::encode(&bytes))
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    pub fn drbg(&self) -> DrbgMode {
        self.core.drbg()
    }

    pub fn state(&self) -> EngineState {
        self.core.state()
    }

    /// Number of messages encoded so far.
    pub fn step(&self) -> u64 {
        self.core.step()
    }

    pub fn session_id(&self) -> &str {
        self.core.session_id()
    }

    pub fn identity(&self) -> Option<&EngineIdentity> {
        self.core.identity()
    }
}
