//! Execution time and network usage telemetry.
//!
//! Network usage is derived from a process-wide cumulative byte counter sampled at three
//! checkpoints: request start, after datacube retrieval and assembly, and after all uploads.
//! The counter is shared with everything else running on the host, so concurrent requests see
//! interleaved deltas. That is an accepted approximation, not a correctness guarantee.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use sysinfo::Networks;

/// A snapshot of the cumulative network byte counters.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NetworkSample {
    /// Total bytes sent since the counter started
    pub bytes_sent: u64,
    /// Total bytes received since the counter started
    pub bytes_received: u64,
}

impl NetworkSample {
    /// Total bytes transferred in either direction.
    pub fn total(&self) -> u64 {
        self.bytes_sent.saturating_add(self.bytes_received)
    }
}

/// Capability for sampling the cumulative network byte counters.
///
/// Injected into the pipeline so that tests can substitute a scripted counter.
pub trait NetworkCounter: Send + Sync {
    /// Take a snapshot of the counters.
    fn sample(&self) -> NetworkSample;
}

/// Network counter backed by the host's interface statistics.
pub struct SysinfoNetworkCounter {
    networks: Mutex<Networks>,
}

impl SysinfoNetworkCounter {
    /// Create and return a [SysinfoNetworkCounter].
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        SysinfoNetworkCounter {
            networks: Mutex::new(Networks::new_with_refreshed_list()),
        }
    }
}

impl NetworkCounter for SysinfoNetworkCounter {
    fn sample(&self) -> NetworkSample {
        let mut networks = self
            .networks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        networks.refresh();
        let (bytes_sent, bytes_received) =
            networks
                .iter()
                .fold((0_u64, 0_u64), |(sent, received), (_, data)| {
                    (
                        sent.saturating_add(data.total_transmitted()),
                        received.saturating_add(data.total_received()),
                    )
                });
        NetworkSample {
            bytes_sent,
            bytes_received,
        }
    }
}

/// Telemetry for one request.
///
/// Records the request start time and the three network checkpoints.
pub struct Telemetry<'a> {
    counter: &'a dyn NetworkCounter,
    started: Instant,
    initial: NetworkSample,
    generated: Option<NetworkSample>,
    uploaded: Option<NetworkSample>,
}

/// Final telemetry figures for one request.
#[derive(Clone, Copy, Debug)]
pub struct TelemetryReport {
    /// Wall-clock time from request start to report assembly
    pub elapsed: Duration,
    /// Bytes transferred during retrieval and assembly
    pub generation_bytes: u64,
    /// Bytes transferred during artifact upload
    pub upload_bytes: u64,
}

impl<'a> Telemetry<'a> {
    /// Start request telemetry, taking the initial network sample.
    pub fn start(counter: &'a dyn NetworkCounter) -> Self {
        Telemetry {
            counter,
            started: Instant::now(),
            initial: counter.sample(),
            generated: None,
            uploaded: None,
        }
    }

    /// Record the checkpoint after datacube retrieval and assembly.
    pub fn mark_generated(&mut self) {
        self.generated = Some(self.counter.sample());
    }

    /// Record the checkpoint after all artifact uploads.
    pub fn mark_uploaded(&mut self) {
        self.uploaded = Some(self.counter.sample());
    }

    /// Compute the final report.
    ///
    /// Deltas saturate at zero; the underlying counter is not monotonic under concurrency.
    pub fn finish(self) -> TelemetryReport {
        let initial = self.initial.total();
        let generated = self.generated.map_or(initial, |sample| sample.total());
        let uploaded = self.uploaded.map_or(generated, |sample| sample.total());
        TelemetryReport {
            elapsed: self.started.elapsed(),
            generation_bytes: generated.saturating_sub(initial),
            upload_bytes: uploaded.saturating_sub(generated),
        }
    }
}
