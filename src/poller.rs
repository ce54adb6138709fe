//! Polling coordination and the metrics snapshot
//!
//! One `DevicePoller` per endpoint owns the scheduler and the snapshot.
//! A tick runs the full command sequence, normalizes each successful
//! response and merges the readings in: freshly observed metrics overwrite
//! and are marked fresh, everything else keeps its previous value marked
//! stale. The snapshot is rebuilt off to the side and swapped in whole, so
//! readers only ever see a complete prior or current cycle. Ticks take
//! `&mut self`, which makes overlapping cycles against one endpoint
//! unrepresentable.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::MarstekConfig;
use crate::error::Result;
use crate::normalize::{extract, MetricValue};
use crate::protocol::Command;
use crate::scheduler::CommandScheduler;
use crate::transport::{DeviceRpc, UdpTransport};

/// One metric in the snapshot, with its freshness flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricReading {
    pub value: MetricValue,
    /// True if observed in the most recent cycle, false if carried over
    pub fresh: bool,
}

/// The complete set of currently-known metrics. Replaced wholesale at the
/// end of each cycle, never partially updated.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    pub metrics: HashMap<&'static str, MetricReading>,
    /// When the most recent cycle finished; `None` before the first cycle
    pub cycle_completed: Option<DateTime<Utc>>,
    /// Commands that failed in the most recent cycle
    pub commands_failed: usize,
}

impl Snapshot {
    pub fn get(&self, name: &str) -> Option<&MetricReading> {
        self.metrics.get(name)
    }

    pub fn fresh_count(&self) -> usize {
        self.metrics.values().filter(|r| r.fresh).count()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

/// Periodic polling coordinator for one device endpoint.
pub struct DevicePoller<T: DeviceRpc> {
    scheduler: CommandScheduler<T>,
    sequence: Vec<Command>,
    poll_interval: std::time::Duration,
    snapshot: Snapshot,
}

impl DevicePoller<UdpTransport> {
    /// Bind a UDP transport for `config` and build a poller around it.
    pub async fn connect(config: &MarstekConfig) -> Result<Self> {
        let transport = UdpTransport::bind(config).await?;
        let scheduler = CommandScheduler::new(transport, config.command_gap());
        Ok(Self::new(scheduler, config))
    }
}

impl<T: DeviceRpc> DevicePoller<T> {
    pub fn new(scheduler: CommandScheduler<T>, config: &MarstekConfig) -> Self {
        Self {
            scheduler,
            sequence: Command::POLL_SEQUENCE.to_vec(),
            poll_interval: config.poll_interval(),
            snapshot: Snapshot::default(),
        }
    }

    /// Override the polled command sequence (the default is the full status
    /// sweep). Order is preserved as given.
    pub fn with_sequence(mut self, sequence: Vec<Command>) -> Self {
        self.sequence = sequence;
        self
    }

    /// Run one full polling cycle and return the resulting snapshot.
    pub async fn tick(&mut self) -> &Snapshot {
        let results = self.scheduler.run_sequence(&self.sequence).await;

        // Build the next snapshot beside the current one; everything starts
        // stale and fresh observations overwrite.
        let mut next = self.snapshot.clone();
        for reading in next.metrics.values_mut() {
            reading.fresh = false;
        }

        let mut failed = 0;
        for (command, outcome) in results {
            match outcome {
                Ok(response) => {
                    let payload = response.result.unwrap_or(serde_json::Value::Null);
                    let readings = extract(command, &payload);
                    debug!(
                        method = command.method(),
                        metrics = readings.len(),
                        "normalized response"
                    );
                    for (name, value) in readings {
                        next.metrics.insert(name, MetricReading { value, fresh: true });
                    }
                }
                Err(_) => failed += 1,
            }
        }

        next.cycle_completed = Some(Utc::now());
        next.commands_failed = failed;
        info!(
            fresh = next.fresh_count(),
            carried = next.metrics.len() - next.fresh_count(),
            failed,
            "poll cycle complete"
        );

        self.snapshot = next;
        &self.snapshot
    }

    /// The last complete snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.clone()
    }

    /// Current metric readings, the host-facing accessor.
    pub fn current_metrics(&self) -> HashMap<&'static str, MetricReading> {
        self.snapshot.metrics.clone()
    }

    /// Drive ticks on the configured interval until cancelled. The first
    /// cycle runs one full interval after startup, so adding an endpoint
    /// never bursts requests at the device. Cancellation abandons any
    /// in-flight wait without error.
    pub async fn run(&mut self, cancel: CancellationToken) {
        let start = tokio::time::Instant::now() + self.poll_interval;
        let mut interval = tokio::time::interval_at(start, self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("poller shutting down");
                    return;
                }
                _ = interval.tick() => {}
            }
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("poller shutting down mid-cycle");
                    return;
                }
                _ = self.tick() => {}
            }
        }
    }

    pub(crate) fn scheduler(&self) -> &CommandScheduler<T> {
        &self.scheduler
    }

    /// The scheduler, for running setup-time validation through the same
    /// rate-limit state the poller uses.
    pub fn scheduler_mut(&mut self) -> &mut CommandScheduler<T> {
        &mut self.scheduler
    }
}
