//! Heartbeats — standalone binary that periodically sends a sequence-numbered
//! CloudEvent to a sink.
//!
//! Flags: --sink, --eventSource, --eventType, --label, --period
//! Env: SINK (overrides --sink), POD_NAME, POD_NAMESPACE (both required)

mod config;
mod delivery;
mod emitter;

use clap::Parser;
use config::{Args, Config, EnvVars};
use delivery::HttpDelivery;
use emitter::Emitter;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    let config = match Config::resolve(&args, &EnvVars::from_env()) {
        Ok(c) => Arc::new(c),
        Err(e) => fatal(&e.to_string()),
    };

    let delivery = match HttpDelivery::new(&config.sink) {
        Ok(d) => d,
        Err(e) => fatal(&e.to_string()),
    };
    match delivery.target() {
        Some(target) => log::info!("[HEARTBEATS] Sending heartbeats to {}", target),
        None => log::warn!("[HEARTBEATS] No sink configured; every heartbeat will fail to send"),
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("[HEARTBEATS] Interrupt received, stopping");
            on_signal.cancel();
        }
    });

    let mut emitter = Emitter::new(config, delivery);
    emitter.run(cancel).await;
    log::info!("[HEARTBEATS] Last heartbeat sent: #{}", emitter.sequence());
}

fn fatal(message: &str) -> ! {
    log::error!("[HEARTBEATS] {}", message);
    eprintln!("Error: {}", message);
    std::process::exit(1);
}
