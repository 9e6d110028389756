//! Per-transfer telemetry.

use serde::{Deserialize, Serialize};

/// Metrics returned from a transfer, complete or aborted.
///
/// On an abort the counters reflect the chunks the peer actually
/// acknowledged before retries ran out.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TransferStats {
    /// Unique DATA frames delivered (retransmissions not included)
    pub packets_sent: u64,
    /// Plaintext bytes acknowledged by the peer
    pub bytes_sent: u64,
    /// Wall-clock duration of the transfer
    pub time_ms: u64,
    /// `(bytes_sent / 1024) / (time_ms / 1000)`
    pub throughput_kbps: f64,
    /// Total timeout-triggered retransmissions across all chunks
    pub retransmissions: u64,
    /// Effective window `min(cwnd, remote_wnd)` recorded per chunk
    pub cwnd_history: Vec<u32>,
}

impl TransferStats {
    /// Seal the record: stamp the elapsed time and derive throughput from
    /// the counters. A sub-millisecond transfer is clamped to 1 ms so the
    /// rate stays finite.
    pub fn finish(&mut self, elapsed_ms: u64) {
        self.time_ms = elapsed_ms.max(1);
        self.throughput_kbps =
            (self.bytes_sent as f64 / 1024.0) / (self.time_ms as f64 / 1000.0);
    }
}
