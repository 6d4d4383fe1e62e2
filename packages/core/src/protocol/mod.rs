// Протокол: wire format, транспорт и ответная сторона (echo peer)

pub mod responder;
pub mod transport;
pub mod wire;
