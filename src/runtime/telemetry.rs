use crate::runtime::offset::OffsetCursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(5);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Lightweight rolling counters used to derive runtime metrics.
#[derive(Default, Debug)]
pub struct Telemetry {
    cycles: AtomicU64,
    items_rendered: AtomicU64,
    empty_cycles: AtomicU64,
    transport_faults: AtomicU64,
    decode_faults: AtomicU64,
}

impl Telemetry {
    pub fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_items_rendered(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.items_rendered.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_empty_cycle(&self) {
        self.empty_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transport_fault(&self) {
        self.transport_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_fault(&self) {
        self.decode_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            items_rendered: self.items_rendered.load(Ordering::Relaxed),
            empty_cycles: self.empty_cycles.load(Ordering::Relaxed),
            transport_faults: self.transport_faults.load(Ordering::Relaxed),
            decode_faults: self.decode_faults.load(Ordering::Relaxed),
        }
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    pub fn items_rendered(&self) -> u64 {
        self.items_rendered.load(Ordering::Relaxed)
    }

    pub fn empty_cycles(&self) -> u64 {
        self.empty_cycles.load(Ordering::Relaxed)
    }

    pub fn transport_faults(&self) -> u64 {
        self.transport_faults.load(Ordering::Relaxed)
    }

    pub fn decode_faults(&self) -> u64 {
        self.decode_faults.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Copy, Clone)]
pub struct TelemetrySnapshot {
    pub cycles: u64,
    pub items_rendered: u64,
    pub empty_cycles: u64,
    pub transport_faults: u64,
    pub decode_faults: u64,
}

/// Spawns a background task that periodically logs throughput, the offset cursor, and fault counts.
pub fn spawn_telemetry_reporter(
    telemetry: Arc<Telemetry>,
    offset: Arc<OffsetCursor>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "pagepoll::metrics", "telemetry reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current_snapshot = telemetry.snapshot();
                    let rendered_delta = current_snapshot
                        .items_rendered
                        .saturating_sub(last_snapshot.items_rendered);
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let throughput = if elapsed <= f64::EPSILON {
                        0.0
                    } else {
                        rendered_delta as f64 / elapsed
                    };

                    tracing::info!(
                        target: "pagepoll::metrics",
                        throughput = format!("{throughput:.2}"),
                        items = current_snapshot.items_rendered,
                        offset = offset.current(),
                        cycles = current_snapshot.cycles,
                        empty_cycles = current_snapshot.empty_cycles,
                        transport_faults = current_snapshot.transport_faults,
                        decode_faults = current_snapshot.decode_faults,
                        "runtime metrics snapshot"
                    );

                    last_snapshot = current_snapshot;
                    last_tick = Instant::now();
                }
            }
        }
    })
}
