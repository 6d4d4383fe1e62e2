// Sealchannel Core
// Seeded encoder/decoder sessions with a typed status contract

#![warn(clippy::all)]

// Модули
pub mod config;
pub mod crypto;
pub mod error;
pub mod protocol;
pub mod state;
pub mod status;
pub mod utils;

// Re-exports для удобства
pub use config::Config;
pub use crypto::suites::standard::StandardBackend;
pub use crypto::{
    CapabilityBackend, Decoder, Direction, DrbgMode, Encoder, EngineIdentity, EngineKind,
    EngineState, ExchangeResult, SeedMaterial, SeedSource,
};
pub use error::{EngineError, ExchangeError, TransportError};
pub use protocol::responder::EchoResponder;
pub use protocol::transport::{LoopbackTransport, Transport};
#[cfg(feature = "http")]
pub use protocol::transport::HttpTransport;
pub use state::exchange::{Exchange, ExchangePhase, RoundTrip};
pub use status::StatusCode;
