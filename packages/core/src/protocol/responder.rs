//! Echo responder
//!
//! Зеркальная сторона обмена: decoder для upstream направления и encoder
//! для downstream. Принимает base64 тело запроса, расшифровывает его и
//! отвечает тем же текстом, зашифрованным в обратном направлении.
//!
//! Перезапуск инициатора виден по epoch в envelope. Сообщение с более
//! высоким epoch открывается новой парой сессий, и только после успешной
//! проверки responder переходит на неё. Сообщения старых epoch отклоняются.

use crate::config::Config;
use crate::crypto::engine::{open_decoder, open_encoder, Decoder, Encoder, EngineState};
use crate::crypto::provider::CapabilityBackend;
use crate::crypto::seed::{Direction, SeedSource};
use crate::protocol::wire;
use crate::status::StatusCode;
use crate::utils::b64;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct EchoResponder<B: CapabilityBackend + ?Sized> {
    backend: Arc<B>,
    config: Config,
    source: SeedSource,
    epoch: u32,
    decoder: Decoder<B>,
    encoder: Encoder<B>,
    handled: u64,
}

impl<B: CapabilityBackend + ?Sized> EchoResponder<B> {
    /// Instantiate both halves at epoch 0 for the identifier and nonces in `config`.
    pub fn new(backend: &Arc<B>, config: &Config, source: &SeedSource) -> Result<Self, StatusCode> {
        let decoder = open_decoder(backend, config, Direction::Upstream, 0, source)?;
        let encoder = open_encoder(backend, config, Direction::Downstream, 0, source)?;
        info!(
            target: "responder",
            identifier = %config.identifier,
            decoder_session = %decoder.session_id(),
            encoder_session = %encoder.session_id(),
            "Responder ready"
        );
        Ok(Self {
            backend: Arc::clone(backend),
            config: config.clone(),
            source: source.clone(),
            epoch: 0,
            decoder,
            encoder,
            handled: 0,
        })
    }

    /// Decode one request body and return the encoded echo.
    pub fn handle(&mut self, body: &str) -> Result<Vec<u8>, StatusCode> {
        let incoming = b64::decode(body).ok().and_then(|bytes| wire::peek_epoch(&bytes));
        let text = match incoming {
            Some(epoch) if epoch > self.epoch => self.follow(epoch, body),
            Some(epoch) if epoch < self.epoch => {
                warn!(target: "responder", epoch, current = self.epoch, "Stale epoch rejected");
                return Err(StatusCode::DecodeFailed);
            }
            _ => self.decoder.decode_b64(body).into_status_result(),
        }
        .map_err(|status| {
            warn!(target: "responder", status = status.name(), "Request rejected");
            status
        })?;
        debug!(target: "responder", text_len = text.len(), "Echoing");

        let response = self.encoder.encode_str(&text).into_status_result()?;
        self.handled += 1;
        Ok(response)
    }

    /// Open fresh sessions at `epoch` and switch to them once `body` authenticates.
    fn follow(&mut self, epoch: u32, body: &str) -> Result<String, StatusCode> {
        let mut decoder = open_decoder(&self.backend, &self.config, Direction::Upstream, epoch, &self.source)?;
        let result = decoder.decode_b64(body);
        if decoder.state() != EngineState::Ready {
            return Err(result.status());
        }
        let encoder = open_encoder(&self.backend, &self.config, Direction::Downstream, epoch, &self.source)?;

        info!(
            target: "responder",
            from = self.epoch,
            to = epoch,
            decoder_session = %decoder.session_id(),
            encoder_session = %encoder.session_id(),
            "Peer restarted"
        );
        self.decoder = decoder;
        self.encoder = encoder;
        self.epoch = epoch;
        result.into_status_result()
    }

    /// Requests answered so far.
    pub fn handled(&self) -> u64 {
        self.handled
    }

    /// Epoch of the sessions currently in use.
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn decoder(&self) -> &Decoder<B> {
        &self.decoder
    }

    pub fn encoder(&self) -> &Encoder<B> {
        &self.encoder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::engine::EngineState;
    use crate::crypto::suites::standard::StandardBackend;

    fn setup() -> (Arc<StandardBackend>, Config) {
        let mut config = Config::default();
        config.insecure_demo_seeding = true;
        let mut backend = StandardBackend::load(&config);
        backend.init_license(&config.license_company, &config.license_key);
        (Arc::new(backend), config)
    }

    #[test]
    fn test_echo_answers_with_downstream_encoding() {
        let (backend, config) = setup();
        let source = SeedSource::InsecureDemo;
        let mut responder = EchoResponder::new(&backend, &config, &source).unwrap();
        let mut client_encoder = open_encoder(&backend, &config, Direction::Upstream, 0, &source).unwrap();
        let mut client_decoder = open_decoder(&backend, &config, Direction::Downstream, 0, &source).unwrap();

        let request = client_encoder.encode_b64("hello").into_payload().unwrap();
        let response = responder.handle(&request).unwrap();
        let echoed = client_decoder.decode_str(&response).into_payload().unwrap();

        assert_eq!(echoed, "hello");
        assert_eq!(responder.handled(), 1);
        assert_eq!(responder.decoder().step(), 1);
        assert_eq!(responder.encoder().step(), 1);
    }

    #[test]
    fn test_license_failure_blocks_responder() {
        let mut config = Config::default();
        config.insecure_demo_seeding = true;
        let backend = Arc::new(StandardBackend::load(&config));
        let result = EchoResponder::new(&backend, &config, &SeedSource::InsecureDemo);
        assert_eq!(result.err(), Some(StatusCode::LicenseError));
    }

    #[test]
    fn test_replayed_request_faults_decoder() {
        let (backend, config) = setup();
        let source = SeedSource::InsecureDemo;
        let mut responder = EchoResponder::new(&backend, &config, &source).unwrap();
        let mut client_encoder = open_encoder(&backend, &config, Direction::Upstream, 0, &source).unwrap();

        let request = client_encoder.encode_b64("once").into_payload().unwrap();
        assert!(responder.handle(&request).is_ok());
        assert_eq!(responder.handle(&request).unwrap_err(), StatusCode::DecodeFailed);
        assert_eq!(
            responder.decoder().state(),
            EngineState::Faulted(StatusCode::DecodeFailed)
        );
    }

    #[test]
    fn test_follows_restarted_peer_and_rejects_stale_epoch() {
        let (backend, config) = setup();
        let source = SeedSource::InsecureDemo;
        let mut responder = EchoResponder::new(&backend, &config, &source).unwrap();

        let mut old_encoder = open_encoder(&backend, &config, Direction::Upstream, 0, &source).unwrap();
        let old_request = old_encoder.encode_b64("before").into_payload().unwrap();
        assert!(responder.handle(&old_request).is_ok());

        let mut new_encoder = open_encoder(&backend, &config, Direction::Upstream, 1, &source).unwrap();
        let mut new_decoder = open_decoder(&backend, &config, Direction::Downstream, 1, &source).unwrap();
        let request = new_encoder.encode_b64("after").into_payload().unwrap();
        let response = responder.handle(&request).unwrap();
        assert_eq!(new_decoder.decode_str(&response).into_payload().unwrap(), "after");
        assert_eq!(responder.epoch(), 1);
        assert_eq!(responder.decoder().step(), 1);

        // The pre-restart message is refused and the current session survives
        assert_eq!(responder.handle(&old_request).unwrap_err(), StatusCode::DecodeFailed);
        assert_eq!(responder.decoder().state(), EngineState::Ready);
        let next = new_encoder.encode_b64("still here").into_payload().unwrap();
        assert!(responder.handle(&next).is_ok());
    }

    #[test]
    fn test_forged_epoch_does_not_switch_sessions() {
        let (backend, config) = setup();
        let source = SeedSource::InsecureDemo;
        let mut responder = EchoResponder::new(&backend, &config, &source).unwrap();
        let mut client_encoder = open_encoder(&backend, &config, Direction::Upstream, 0, &source).unwrap();

        let mut bytes = client_encoder.encode(b"hello").into_payload().unwrap();
        bytes[5] = 9;
        assert_eq!(responder.handle(&b64::encode(&bytes)).unwrap_err(), StatusCode::DecodeFailed);
        assert_eq!(responder.epoch(), 0);
        assert_eq!(responder.decoder().state(), EngineState::Ready);
    }
}
