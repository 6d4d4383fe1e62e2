use super::{EngineIdentity, EngineState, ExchangeResult, PendingStep, SessionCore};
use crate::crypto::provider::{CapabilityBackend, ChainKey};
use crate::crypto::seed::SeedMaterial;
use crate::crypto::DrbgMode;
use crate::error::CryptoError;
use crate::protocol::wire::{self, Envelope, FrameMode};
use crate::status::StatusCode;
use crate::utils::b64;
use std::sync::Arc;
use tracing::{debug, trace};
use zeroize::Zeroizing;

/// Receiving half of a session: opaque envelope → plaintext.
///
/// Decoding is all-or-nothing. Any failure faults the decoder: the paired
/// encoder has moved on and the two can no longer be resynchronised.
///
/// Every frame mode is accepted; the mode byte is part of the associated
/// data, so it cannot be switched in transit. Envelopes from another epoch
/// are `DecodeFailed`.
pub struct Decoder<B: CapabilityBackend + ?Sized> {
    core: SessionCore<B>,
}

impl<B: CapabilityBackend + ?Sized> Decoder<B> {
    pub fn new(backend: Arc<B>, drbg: DrbgMode) -> Self {
        Self {
            core: SessionCore::new(backend, drbg, "decoder"),
        }
    }

    /// `Uninstantiated → Ready`, or `Faulted` with the returned status.
    pub fn instantiate(&mut self, identity: EngineIdentity, seed: SeedMaterial) -> StatusCode {
        self.core.instantiate(identity, seed)
    }

    /// Decode the paired encoder's next message.
    pub fn decode(&mut self, encoded: &[u8]) -> ExchangeResult<Vec<u8>> {
        self.decode_inner(encoded).into()
    }

    /// Decode and interpret the payload as UTF-8.
    ///
    /// An authentic payload that is not UTF-8 still consumes its step (the
    /// encoder did), so the session stays usable; only the text is refused.
    pub fn decode_str(&mut self, encoded: &[u8]) -> ExchangeResult<String> {
        match self.decode_inner(encoded) {
            Ok(bytes) => String::from_utf8(bytes)
                .map_err(|_| StatusCode::InvalidText)
                .into(),
            Err(status) => ExchangeResult::failure(status),
        }
    }

    /// Decode a base64 text envelope into UTF-8 text.
    pub fn decode_b64(&mut self, encoded: &str) -> ExchangeResult<String> {
        if let Err(status) = self.core.guard() {
            return ExchangeResult::failure(status);
        }
        match b64::decode(encoded) {
            Ok(bytes) => self.decode_str(&bytes),
            Err(status) => {
                self.core.fault(status);
                ExchangeResult::failure(status)
            }
        }
    }

    fn decode_inner(&mut self, encoded: &[u8]) -> Result<Vec<u8>, StatusCode> {
        // Guard failures leave the engine untouched
        self.core.guard()?;

        match self.open_next(encoded) {
            Ok((plaintext, next_chain)) => {
                trace!(
                    target: "engine::decoder",
                    session_id = %self.core.session_id(),
                    step = self.core.step(),
                    plaintext_len = plaintext.len(),
                    "Message decoded"
                );
                self.core.commit(next_chain);
                Ok(plaintext)
            }
            Err(status) => {
                debug!(
                    target: "engine::decoder",
                    session_id = %self.core.session_id(),
                    step = self.core.step(),
                    encoded_len = encoded.len(),
                    status = status.name(),
                    "Decode failed"
                );
                self.core.fault(status);
                Err(status)
            }
        }
    }

    fn open_next(
        &self,
        encoded: &[u8],
    ) -> Result<(Vec<u8>, ChainKey), StatusCode> {
        let backend = self.core.backend();
        let envelope = wire::unpack_envelope(encoded, backend.overhead(), backend.key_len())?;
        if envelope.epoch != self.core.epoch() {
            debug!(
                target: "engine::decoder",
                expected = self.core.epoch(),
                received = envelope.epoch,
                "Epoch mismatch"
            );
            return Err(StatusCode::DecodeFailed);
        }
        let pending = self.core.prepare_step(envelope.mode)?;

        let frame = Zeroizing::new(
            self.open_frame(&pending, &envelope)
                .map_err(|_| StatusCode::DecodeFailed)?,
        );
        let plaintext = wire::unframe_plaintext(&frame)?;

        Ok((plaintext, pending.next_chain))
    }

    fn open_frame(&self, pending: &PendingStep, envelope: &Envelope<'_>) -> Result<Vec<u8>, CryptoError> {
        let backend = self.core.backend();
        let aad = &pending.associated_data;
        match envelope.mode {
            FrameMode::Direct => backend.open(&pending.keys, envelope.sealed, aad),
            FrameMode::ManagedKey => {
                // Длина проверена в unpack_envelope
                let split = wire::wrapped_key_len(backend.key_len(), backend.overhead());
                let (wrapped, body) = envelope.sealed.split_at(split);
                let message_key = Zeroizing::new(backend.open(&pending.keys, wrapped, aad)?);
                let message_keys = backend.message_keys(&message_key)?;
                backend.open(&message_keys, body, aad)
            }
        }
    }

    pub fn drbg(&self) -> DrbgMode {
        self.core.drbg()
    }

    pub fn state(&self) -> EngineState {
        self.core.state()
    }

    /// Number of messages decoded so far.
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
