// exchange-demo
//
// Читает строки из stdin, отправляет каждую пиру и печатает результат.
// `quit` отправляется как обычное сообщение и завершает работу.
// Ошибка round trip печатается; если обмен перешёл в Failed, он
// перезапускается со следующим epoch и цикл продолжается.
//
//   exchange-demo               HTTP peer at SEALCHANNEL_HOST:SEALCHANNEL_PORT
//   exchange-demo --loopback    in-process echo responder
//   exchange-demo --json        one JSON object per round trip

use anyhow::{bail, Context};
use sealchannel_core::utils::logging;
use sealchannel_core::{
    CapabilityBackend, Config, EchoResponder, EngineError, Exchange, ExchangeError, ExchangePhase,
    HttpTransport, LoopbackTransport, RoundTrip, SeedSource, StandardBackend, Transport,
};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing::{info, warn};

const QUIT: &str = "quit";

fn main() -> anyhow::Result<()> {
    logging::init("info");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let loopback = args.iter().any(|a| a == "--loopback");
    let json = args.iter().any(|a| a == "--json");

    let mut config = Config::from_env();
    if loopback && config.shared_entropy.is_none() {
        config.insecure_demo_seeding = true;
    }
    Config::init_with(config)?;
    let config = Config::global();

    let mut backend = StandardBackend::load(config);
    let license = backend.init_license(&config.license_company, &config.license_key);
    if !license.is_success() {
        bail!("License error: {}", license);
    }
    let backend = Arc::new(backend);

    let mut transport: Box<dyn Transport> = if loopback {
        let source = SeedSource::from_config(config).context("no seed source configured")?;
        let responder = EchoResponder::new(&backend, config, &source).map_err(EngineError)?;
        Box::new(LoopbackTransport::new(responder))
    } else {
        info!(url = %config.peer_url(), "Using HTTP peer");
        Box::new(HttpTransport::new(config))
    };

    let mut exchange = Exchange::new(Arc::clone(&backend), config.clone());
    exchange.setup().context("failed to set up exchange")?;

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    print!("> ");
    stdout.flush()?;

    for line in stdin.lock().lines() {
        let line = line?;
        handle_line(&mut exchange, transport.as_mut(), &line, json, &mut stdout)?;

        if line == QUIT {
            break;
        }
        print!("> ");
        stdout.flush()?;
    }

    Ok(())
}

/// One line: round trip and print. A failed exchange is restarted at the
/// next epoch; only a failed restart ends the loop.
fn handle_line<B, W>(
    exchange: &mut Exchange<B>,
    transport: &mut dyn Transport,
    line: &str,
    json: bool,
    out: &mut W,
) -> anyhow::Result<()>
where
    B: CapabilityBackend + ?Sized,
    W: Write,
{
    match exchange.round_trip(line, transport) {
        Ok(trip) => show(&trip, json, out),
        Err(e) => {
            report(&e, out)?;
            if exchange.phase() == ExchangePhase::Failed {
                exchange.restart().context("failed to restart exchange")?;
                info!(epoch = exchange.epoch(), "Exchange restarted");
            }
            Ok(())
        }
    }
}

fn report<W: Write>(error: &ExchangeError, out: &mut W) -> anyhow::Result<()> {
    warn!(error = %error, "Round trip failed");
    match error.status() {
        Some(status) => writeln!(out, "error:    {}", status)?,
        None => writeln!(out, "error:    {}", error)?,
    }
    Ok(())
}

fn show<W: Write>(trip: &RoundTrip, json: bool, out: &mut W) -> anyhow::Result<()> {
    if json {
        writeln!(out, "{}", serde_json::to_string(trip)?)?;
    } else {
        writeln!(out, "sent:     {}", trip.outgoing_encoded)?;
        writeln!(out, "received: {}", trip.incoming_encoded)?;
        writeln!(out, "decoded:  {}", trip.decoded)?;
    }
    Ok(())
}
