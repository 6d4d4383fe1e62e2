//! Exchange Orchestrator
//!
//! Явная state machine вместо набора флагов:
//!
//! ```text
//! Idle ─setup─▶ Seeding ─▶ EncodersReady ─round_trip─▶ AwaitingPeer ─▶ Complete
//!                  │                                        │             │
//!                  └──────────────▶ Failed ◀────────────────┘◀────────────┘
//! ```
//!
//! После `Failed` продолжать нельзя: encoder уже продвинулся, а decoder пира
//! мог получить или не получить сообщение. Единственный выход: `restart()`
//! с новыми сессиями следующего epoch. Epoch входит в root derivation, так что
//! тот же seed не повторяет ни ключи, ни nonce прошлого setup; пир узнаёт
//! epoch из envelope и переходит на него сам.

use crate::config::Config;
use crate::crypto::engine::{open_decoder, open_encoder, Decoder, Encoder, EngineState};
use crate::crypto::provider::CapabilityBackend;
use crate::crypto::seed::{Direction, SeedSource};
use crate::error::{EngineError, ExchangeError, Result};
use crate::protocol::transport::Transport;
use crate::status::StatusCode;
use crate::utils::b64;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Phase of the exchange state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExchangePhase {
    Idle,
    Seeding,
    EncodersReady,
    AwaitingPeer,
    Complete,
    Failed,
}

impl ExchangePhase {
    fn can_send(self) -> bool {
        matches!(self, ExchangePhase::EncodersReady | ExchangePhase::Complete)
    }
}

/// The three strings a completed round trip presents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundTrip {
    /// Base64 of what was sent.
    pub outgoing_encoded: String,
    /// Base64 of what came back.
    pub incoming_encoded: String,
    /// Decoded reply text.
    pub decoded: String,
}

/// Initiator side of an echo exchange: upstream encoder, downstream decoder.
pub struct Exchange<B: CapabilityBackend + ?Sized> {
    backend: Arc<B>,
    config: Config,
    phase: ExchangePhase,
    encoder: Option<Encoder<B>>,
    decoder: Option<Decoder<B>>,
    round_trips: u64,
    epoch: u32,
}

impl<B: CapabilityBackend + ?Sized> Exchange<B> {
    pub fn new(backend: Arc<B>, config: Config) -> Self {
        Self {
            backend,
            config,
            phase: ExchangePhase::Idle,
            encoder: None,
            decoder: None,
            round_trips: 0,
            epoch: 0,
        }
    }

    pub fn phase(&self) -> ExchangePhase {
        self.phase
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Completed round trips since the last setup.
    pub fn round_trips(&self) -> u64 {
        self.round_trips
    }

    /// Setup generation: 0 after the first setup, +1 per restart.
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn encoder(&self) -> Option<&Encoder<B>> {
        self.encoder.as_ref()
    }

    pub fn decoder(&self) -> Option<&Decoder<B>> {
        self.decoder.as_ref()
    }

    /// `Idle → Seeding → EncodersReady`.
    ///
    /// Both engines must reach Ready; otherwise the exchange ends in `Failed`
    /// and neither engine is kept.
    pub fn setup(&mut self) -> Result<()> {
        if self.phase != ExchangePhase::Idle {
            return Err(ExchangeError::InvalidState(self.phase));
        }
        self.phase = ExchangePhase::Seeding;

        let source = match SeedSource::from_config(&self.config) {
            Some(source) => source,
            None => {
                self.fail("no seed source");
                return Err(ExchangeError::Config(
                    "no shared entropy configured and insecure demo seeding is disabled"
                        .to_string(),
                ));
            }
        };

        let epoch = self.epoch;
        let engines = open_encoder(&self.backend, &self.config, Direction::Upstream, epoch, &source)
            .and_then(|encoder| {
                open_decoder(&self.backend, &self.config, Direction::Downstream, epoch, &source)
                    .map(|decoder| (encoder, decoder))
            });

        match engines {
            Ok((encoder, decoder)) => {
                info!(
                    target: "exchange",
                    identifier = %self.config.identifier,
                    drbg = self.config.drbg.name(),
                    epoch,
                    encoder_session = %encoder.session_id(),
                    decoder_session = %decoder.session_id(),
                    "Encoders ready"
                );
                self.encoder = Some(encoder);
                self.decoder = Some(decoder);
                self.round_trips = 0;
                self.phase = ExchangePhase::EncodersReady;
                Ok(())
            }
            Err(status) => {
                self.fail(status.name());
                Err(EngineError(status).into())
            }
        }
    }

    /// Encode `plaintext`, hand it to `transport`, decode the reply.
    ///
    /// Allowed from `EncodersReady` or `Complete`. A plaintext the encoder
    /// refuses without advancing (e.g. `BufferTooSmall`) leaves the phase
    /// unchanged; every other failure moves to `Failed`.
    pub fn round_trip<T: Transport + ?Sized>(
        &mut self,
        plaintext: &str,
        transport: &mut T,
    ) -> Result<RoundTrip> {
        if !self.phase.can_send() {
            return Err(ExchangeError::InvalidState(self.phase));
        }
        let (encoder, decoder) = match (self.encoder.as_mut(), self.decoder.as_mut()) {
            (Some(encoder), Some(decoder)) => (encoder, decoder),
            _ => return Err(EngineError(StatusCode::NotInstantiated).into()),
        };

        let outgoing_encoded = match encoder.encode_b64(plaintext).into_result() {
            Ok(text) => text,
            Err(e) => {
                if encoder.state() != EngineState::Ready {
                    self.fail(e.status().name());
                }
                return Err(e.into());
            }
        };

        self.phase = ExchangePhase::AwaitingPeer;
        debug!(
            target: "exchange",
            step = encoder.step(),
            body_len = outgoing_encoded.len(),
            "Sending"
        );

        let response = match transport.exchange(&outgoing_encoded) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.fail("transport");
                return Err(e.into());
            }
        };
        let incoming_encoded = b64::encode(&response);

        let decoded = match decoder.decode_str(&response).into_result() {
            Ok(text) => text,
            Err(e) => {
                // InvalidText leaves the decoder in step with the peer
                if decoder.state() == EngineState::Ready {
                    self.phase = ExchangePhase::Complete;
                } else {
                    self.fail(e.status().name());
                }
                return Err(e.into());
            }
        };

        self.round_trips += 1;
        self.phase = ExchangePhase::Complete;
        debug!(target: "exchange", round_trips = self.round_trips, "Round trip complete");

        Ok(RoundTrip {
            outgoing_encoded,
            incoming_encoded,
            decoded,
        })
    }

    /// Discard both sessions and seed fresh ones at the next epoch. Allowed
    /// from any phase.
    pub fn restart(&mut self) -> Result<()> {
        let epoch = self
            .epoch
            .checked_add(1)
            .ok_or_else(|| ExchangeError::Config("restart limit reached".to_string()))?;
        info!(target: "exchange", phase = ?self.phase, epoch, "Restarting exchange");
        self.encoder = None;
        self.decoder = None;
        self.epoch = epoch;
        self.phase = ExchangePhase::Idle;
        self.setup()
    }

    fn fail(&mut self, reason: &str) {
        warn!(target: "exchange", phase = ?self.phase, reason, "Exchange failed");
        self.encoder = None;
        self.decoder = None;
        self.phase = ExchangePhase::Failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::suites::standard::StandardBackend;
    use crate::error::TransportError;
    use crate::protocol::responder::EchoResponder;
    use crate::protocol::transport::{ConnectionState, LoopbackTransport};

    struct DownTransport;

    impl Transport for DownTransport {
        fn exchange(&mut self, _body: &str) -> std::result::Result<Vec<u8>, TransportError> {
            Err(TransportError::Connection("refused".to_string()))
        }

        fn state(&self) -> ConnectionState {
            ConnectionState::Failed
        }
    }

    fn demo_config() -> Config {
        let mut config = Config::default();
        config.insecure_demo_seeding = true;
        config
    }

    fn licensed(config: &Config) -> Arc<StandardBackend> {
        let mut backend = StandardBackend::load(config);
        backend.init_license(&config.license_company, &config.license_key);
        Arc::new(backend)
    }

    fn loopback(backend: &Arc<StandardBackend>, config: &Config) -> LoopbackTransport<StandardBackend> {
        let responder = EchoResponder::new(backend, config, &SeedSource::InsecureDemo).unwrap();
        LoopbackTransport::new(responder)
    }

    #[test]
    fn test_setup_reaches_encoders_ready() {
        let config = demo_config();
        let mut exchange = Exchange::new(licensed(&config), config);
        assert_eq!(exchange.phase(), ExchangePhase::Idle);
        exchange.setup().unwrap();
        assert_eq!(exchange.phase(), ExchangePhase::EncodersReady);
        assert!(exchange.encoder().is_some());
        assert!(exchange.decoder().is_some());
    }

    #[test]
    fn test_setup_twice_is_rejected() {
        let config = demo_config();
        let mut exchange = Exchange::new(licensed(&config), config);
        exchange.setup().unwrap();
        match exchange.setup() {
            Err(ExchangeError::InvalidState(ExchangePhase::EncodersReady)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_setup_without_seed_source_fails() {
        let config = Config::default();
        let mut exchange = Exchange::new(licensed(&config), config);
        assert!(matches!(exchange.setup(), Err(ExchangeError::Config(_))));
        assert_eq!(exchange.phase(), ExchangePhase::Failed);
    }

    #[test]
    fn test_unlicensed_setup_fails() {
        let config = demo_config();
        let backend = Arc::new(StandardBackend::load(&config));
        let mut exchange = Exchange::new(backend, config);
        let err = exchange.setup().unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::LicenseError));
        assert_eq!(exchange.phase(), ExchangePhase::Failed);
    }

    #[test]
    fn test_round_trip_before_setup_is_rejected() {
        let config = demo_config();
        let backend = licensed(&config);
        let mut transport = loopback(&backend, &config);
        let mut exchange = Exchange::new(backend, config);
        assert!(matches!(
            exchange.round_trip("hello", &mut transport),
            Err(ExchangeError::InvalidState(ExchangePhase::Idle))
        ));
    }

    #[test]
    fn test_echo_round_trips() {
        let config = demo_config();
        let backend = licensed(&config);
        let mut transport = loopback(&backend, &config);
        let mut exchange = Exchange::new(backend, config);
        exchange.setup().unwrap();

        let first = exchange.round_trip("hello", &mut transport).unwrap();
        assert_eq!(first.decoded, "hello");
        assert_ne!(first.outgoing_encoded, first.incoming_encoded);

        let second = exchange.round_trip("hello", &mut transport).unwrap();
        assert_eq!(second.decoded, "hello");
        assert_ne!(first.outgoing_encoded, second.outgoing_encoded);

        assert_eq!(exchange.phase(), ExchangePhase::Complete);
        assert_eq!(exchange.round_trips(), 2);
    }

    #[test]
    fn test_transport_failure_then_restart() {
        let config = demo_config();
        let backend = licensed(&config);
        let mut exchange = Exchange::new(backend.clone(), config.clone());
        exchange.setup().unwrap();

        let err = exchange.round_trip("lost", &mut DownTransport).unwrap_err();
        assert!(matches!(err, ExchangeError::Transport(_)));
        assert_eq!(exchange.phase(), ExchangePhase::Failed);
        assert!(matches!(
            exchange.round_trip("again", &mut DownTransport),
            Err(ExchangeError::InvalidState(ExchangePhase::Failed))
        ));

        // A fresh peer picks up the new epoch from the first message
        exchange.restart().unwrap();
        assert_eq!(exchange.epoch(), 1);
        let mut transport = loopback(&backend, &config);
        let trip = exchange.round_trip("back", &mut transport).unwrap();
        assert_eq!(trip.decoded, "back");
        assert_eq!(transport.responder().epoch(), 1);
    }

    #[test]
    fn test_restart_never_repeats_keys() {
        let mut config = Config::default();
        config.shared_entropy = Some(crate::crypto::seed::generate_entropy(32).to_vec());
        let backend = licensed(&config);
        let source = SeedSource::from_config(&config).unwrap();
        let responder = EchoResponder::new(&backend, &config, &source).unwrap();
        let mut transport = LoopbackTransport::new(responder);
        let mut exchange = Exchange::new(backend, config);
        exchange.setup().unwrap();

        let before = exchange.round_trip("same text", &mut transport).unwrap();
        exchange.restart().unwrap();
        let after = exchange.round_trip("same text", &mut transport).unwrap();

        // Step 0 of each epoch: same seed, same plaintext, different output
        assert_ne!(before.outgoing_encoded, after.outgoing_encoded);
        assert_ne!(before.incoming_encoded, after.incoming_encoded);
        assert_eq!(after.decoded, "same text");

        // The pre-restart request is not accepted again
        match transport.exchange(&before.outgoing_encoded) {
            Err(TransportError::Rejected(status)) => assert_eq!(status, StatusCode::DecodeFailed),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_restart_limit() {
        let config = demo_config();
        let mut exchange = Exchange::new(licensed(&config), config);
        exchange.epoch = u32::MAX;
        assert!(matches!(exchange.restart(), Err(ExchangeError::Config(_))));
        assert_eq!(exchange.epoch(), u32::MAX);
    }

    #[test]
    fn test_oversized_plaintext_keeps_phase() {
        let mut config = demo_config();
        config.fixed_length = Some(8);
        let backend = licensed(&config);
        let mut transport = loopback(&backend, &config);
        let mut exchange = Exchange::new(backend, config);
        exchange.setup().unwrap();

        let err = exchange.round_trip("far too long for eight", &mut transport).unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::BufferTooSmall));
        assert_eq!(exchange.phase(), ExchangePhase::EncodersReady);
        assert_eq!(exchange.round_trip("short", &mut transport).unwrap().decoded, "short");
    }
}
