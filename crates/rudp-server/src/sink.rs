//! Delivery sinks: where reassembled bytes go.
//!
//! The receiver drains each connection's in-order bytes into a sink as they
//! arrive, which keeps the advertised window open regardless of transfer
//! size. Implementations must be cheap: the socket loop calls them inline.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tracing::info;

/// Consumer of reassembled in-order bytes.
///
/// `Send + 'static` so a receiver can run on its own thread.
pub trait DeliverySink: Send + 'static {
    /// In-order plaintext delivered from `peer`. Calls for one peer arrive
    /// in stream order.
    fn on_data(&mut self, peer: SocketAddr, bytes: Bytes);

    /// The peer completed its transfer (FIN handled).
    fn on_close(&mut self, peer: SocketAddr);
}

/// Default sink: log and discard.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DeliverySink for LogSink {
    fn on_data(&mut self, peer: SocketAddr, bytes: Bytes) {
        info!(%peer, len = bytes.len(), "delivered");
    }

    fn on_close(&mut self, peer: SocketAddr) {
        info!(%peer, "transfer complete");
    }
}

/// Accumulating sink for tests and the benchmark driver.
///
/// Clones share the same underlying buffers, so a test can hand one clone
/// to the receiver thread and inspect the other.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    inner: Arc<Mutex<MemorySinkInner>>,
}

#[derive(Debug, Default)]
struct MemorySinkInner {
    buffers: HashMap<SocketAddr, Vec<u8>>,
    closed: Vec<SocketAddr>,
}

impl MemorySink {
    /// Empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes delivered so far from `peer`, in stream order.
    #[must_use]
    pub fn bytes_from(&self, peer: SocketAddr) -> Vec<u8> {
        self.lock().buffers.get(&peer).cloned().unwrap_or_default()
    }

    /// Whether `peer`'s transfer has completed.
    #[must_use]
    pub fn is_closed(&self, peer: SocketAddr) -> bool {
        self.lock().closed.contains(&peer)
    }

    /// Total bytes delivered across all peers.
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.lock().buffers.values().map(Vec::len).sum()
    }

    /// Peers that have delivered at least one byte.
    #[must_use]
    pub fn peers(&self) -> Vec<SocketAddr> {
        self.lock().buffers.keys().copied().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemorySinkInner> {
        // A poisoned lock only means a panicking test thread; the data is
        // still usable.
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl DeliverySink for MemorySink {
    fn on_data(&mut self, peer: SocketAddr, bytes: Bytes) {
        self.lock().buffers.entry(peer).or_default().extend_from_slice(&bytes);
    }

    fn on_close(&mut self, peer: SocketAddr) {
        self.lock().closed.push(peer);
    }
}
