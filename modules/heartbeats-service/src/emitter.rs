//! Emission loop.
//!
//! One sequential loop: wait for the tick, bump the counter, build the envelope,
//! deliver it, log any failure, repeat. It never stops on its own; only the
//! cancellation token ends it.

use crate::config::Config;
use crate::delivery::Delivery;
use std::sync::Arc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub struct Emitter<D: Delivery> {
    config: Arc<Config>,
    delivery: D,
    /// Last sequence number handed out; the first tick sends 1.
    sequence: u64,
}

impl<D: Delivery> Emitter<D> {
    pub fn new(config: Arc<Config>, delivery: D) -> Self {
        Self {
            config,
            delivery,
            sequence: 0,
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Run until `cancel` fires. The first tick comes one full period after start.
    pub async fn run(&mut self, cancel: CancellationToken) {
        let period = self.config.period;
        log::info!(
            "[HEARTBEATS] Emitter started (period: {}s, source: {}, type: {})",
            period.as_secs(),
            self.config.source,
            self.config.event_type
        );

        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        // A late cycle gets at most one immediate tick, then realigns to the schedule.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    log::info!("[HEARTBEATS] Emitter cancelled");
                    return;
                }
                _ = ticker.tick() => {}
            }

            self.emit_once().await;
        }
    }

    /// One cycle: increment, build, deliver. Delivery failures are logged and dropped.
    pub async fn emit_once(&mut self) -> u64 {
        self.sequence = self.sequence.wrapping_add(1);

        let event = heartbeats_types::build(
            self.sequence,
            &self.config.label,
            &self.config.source,
            &self.config.event_type,
        );

        match self.delivery.send(&event).await {
            Ok(()) => log::debug!("[HEARTBEATS] Sent heartbeat #{}", self.sequence),
            Err(e) => log::warn!("[HEARTBEATS] failed to send cloudevent: {}", e),
        }

        self.sequence
    }
}
