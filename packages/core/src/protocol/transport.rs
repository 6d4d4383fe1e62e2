// Transport
// Доставка одного encoded сообщения пиру и получение ответа.
//
// Transport ничего не знает о сессии: он передаёт base64 текст и возвращает
// сырые байты ответа. Ошибки транспорта остаются в TransportError.

use crate::crypto::provider::CapabilityBackend;
use crate::error::TransportError;
use crate::protocol::responder::EchoResponder;
use tracing::{debug, warn};

#[cfg(feature = "http")]
use crate::config::Config;
#[cfg(feature = "http")]
use std::io::Read;
#[cfg(feature = "http")]
use std::time::Duration;

/// Состояние соединения
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    InFlight,
    Failed,
}

/// One request/response delivery to the peer.
pub trait Transport {
    /// Send `body` (base64 text) and return the raw response bytes.
    fn exchange(&mut self, body: &str) -> Result<Vec<u8>, TransportError>;

    fn state(&self) -> ConnectionState;
}

// ============================================================================
// HTTP
// ============================================================================

/// Blocking HTTP POST transport: one request per message.
#[cfg(feature = "http")]
pub struct HttpTransport {
    agent: ureq::Agent,
    url: String,
    state: ConnectionState,
}

#[cfg(feature = "http")]
impl HttpTransport {
    pub fn new(config: &Config) -> Self {
        Self::with_url(config.peer_url(), config.transport_timeout_ms)
    }

    pub fn with_url(url: impl Into<String>, timeout_ms: u64) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(timeout_ms))
            .build();
        Self {
            agent,
            url: url.into(),
            state: ConnectionState::Idle,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn post(&self, body: &str) -> Result<Vec<u8>, TransportError> {
        let response = match self
            .agent
            .post(&self.url)
            .set("Content-Type", "text/plain")
            .send_string(body)
        {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => return Err(TransportError::Status(code)),
            Err(e) => return Err(TransportError::Connection(e.to_string())),
        };

        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|e| TransportError::Body(e.to_string()))?;
        Ok(bytes)
    }
}

#[cfg(feature = "http")]
impl Transport for HttpTransport {
    fn exchange(&mut self, body: &str) -> Result<Vec<u8>, TransportError> {
        self.state = ConnectionState::InFlight;
        debug!(target: "transport", url = %self.url, body_len = body.len(), "POST");

        match self.post(body) {
            Ok(bytes) => {
                debug!(target: "transport", response_len = bytes.len(), "Response received");
                self.state = ConnectionState::Idle;
                Ok(bytes)
            }
            Err(e) => {
                warn!(target: "transport", url = %self.url, error = %e, "Request failed");
                self.state = ConnectionState::Failed;
                Err(e)
            }
        }
    }

    fn state(&self) -> ConnectionState {
        self.state
    }
}

// ============================================================================
// Loopback
// ============================================================================

/// In-process transport: hands the body straight to an [`EchoResponder`].
pub struct LoopbackTransport<B: CapabilityBackend + ?Sized> {
    responder: EchoResponder<B>,
    state: ConnectionState,
}

impl<B: CapabilityBackend + ?Sized> LoopbackTransport<B> {
    pub fn new(responder: EchoResponder<B>) -> Self {
        Self {
            responder,
            state: ConnectionState::Idle,
        }
    }

    pub fn responder(&self) -> &EchoResponder<B> {
        &self.responder
    }
}

impl<B: CapabilityBackend + ?Sized> Transport for LoopbackTransport<B> {
    fn exchange(&mut self, body: &str) -> Result<Vec<u8>, TransportError> {
        debug!(target: "transport", body_len = body.len(), "Loopback exchange");
        match self.responder.handle(body) {
            Ok(bytes) => {
                self.state = ConnectionState::Idle;
                Ok(bytes)
            }
            Err(status) => {
                warn!(target: "transport", status = status.name(), "Loopback peer rejected request");
                self.state = ConnectionState::Failed;
                Err(TransportError::Rejected(status))
            }
        }
    }

    fn state(&self) -> ConnectionState {
        self.state
    }
}
