//! Congestion window state machine.
//!
//! Classic slow-start / congestion-avoidance with a timeout-triggered
//! multiplicative decrease, in whole-chunk units. The sender applies one
//! update per delivered chunk; a chunk that needed any retransmission counts
//! as a timeout loss.
//!
//! ```text
//! delivered, no retries:  cwnd < ssthresh  =>  cwnd = min(cwnd * 2, ssthresh)
//!                         cwnd >= ssthresh =>  cwnd = cwnd + 1
//! delivered, retries > 0: ssthresh = max(cwnd / 2, 1); cwnd = 1
//! ```

/// Congestion window at connection start, in chunks.
pub const INITIAL_CWND: u32 = 1;

/// Slow-start threshold at connection start, in chunks.
pub const DEFAULT_SSTHRESH: u32 = 64;

/// Sender-side congestion window record.
///
/// With the toggle disabled (the benchmark's CC-off arm) the window is
/// pinned fully open at [`DEFAULT_SSTHRESH`] and updates are no-ops, so the
/// recorded effective window reflects flow control alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Congestion {
    cwnd: u32,
    ssthresh: u32,
    enabled: bool,
}

impl Congestion {
    /// Congestion control active, windows at their initial values.
    #[must_use]
    pub fn new() -> Self {
        Self { cwnd: INITIAL_CWND, ssthresh: DEFAULT_SSTHRESH, enabled: true }
    }

    /// Congestion control disabled; the window stays fully open.
    #[must_use]
    pub fn disabled() -> Self {
        Self { cwnd: DEFAULT_SSTHRESH, ssthresh: DEFAULT_SSTHRESH, enabled: false }
    }

    /// Current congestion window, in chunks.
    #[must_use]
    pub fn cwnd(&self) -> u32 {
        self.cwnd
    }

    /// Current slow-start threshold, in chunks.
    #[must_use]
    pub fn ssthresh(&self) -> u32 {
        self.ssthresh
    }

    /// Whether the window still grows exponentially.
    #[must_use]
    pub fn in_slow_start(&self) -> bool {
        self.cwnd < self.ssthresh
    }

    /// Apply the per-chunk update after a delivery.
    ///
    /// `retries` is the number of timeouts the chunk needed; any nonzero
    /// value is treated as a timeout loss.
    pub fn on_chunk_delivered(&mut self, retries: u64) {
        if !self.enabled {
            return;
        }

        if retries > 0 {
            self.ssthresh = (self.cwnd / 2).max(1);
            self.cwnd = INITIAL_CWND;
        } else if self.cwnd < self.ssthresh {
            self.cwnd = (self.cwnd * 2).min(self.ssthresh);
        } else {
            self.cwnd += 1;
        }
    }

    /// Effective send window: congestion window capped by the peer's
    /// advertised window.
    #[must_use]
    pub fn effective_window(&self, remote_wnd: u32) -> u32 {
        self.cwnd.min(remote_wnd)
    }
}

impl Default for Congestion {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn slow_start_doubles_up_to_ssthresh() {
        let mut cc = Congestion::new();
        let mut seen = Vec::new();
        for _ in 0..8 {
            cc.on_chunk_delivered(0);
            seen.push(cc.cwnd());
        }
        assert_eq!(seen, vec![2, 4, 8, 16, 32, 64, 65, 66]);
    }

    #[test]
    fn timeout_loss_halves_ssthresh_and_resets_cwnd() {
        let mut cc = Congestion::new();
        for _ in 0..5 {
            cc.on_chunk_delivered(0);
        }
        assert_eq!(cc.cwnd(), 32);

        cc.on_chunk_delivered(2);
        assert_eq!(cc.ssthresh(), 16);
        assert_eq!(cc.cwnd(), INITIAL_CWND);
        assert!(cc.in_slow_start());
    }

    #[test]
    fn ssthresh_floor_is_one() {
        let mut cc = Congestion::new();
        cc.on_chunk_delivered(1); // cwnd 1 -> ssthresh max(0,1) = 1
        assert_eq!(cc.ssthresh(), 1);
        assert_eq!(cc.cwnd(), 1);

        // cwnd == ssthresh: straight to congestion avoidance
        cc.on_chunk_delivered(0);
        assert_eq!(cc.cwnd(), 2);
    }

    #[test]
    fn disabled_window_never_moves() {
        let mut cc = Congestion::disabled();
        cc.on_chunk_delivered(0);
        cc.on_chunk_delivered(3);
        assert_eq!(cc.cwnd(), DEFAULT_SSTHRESH);
        assert_eq!(cc.effective_window(16), 16);
    }

    #[test]
    fn effective_window_takes_minimum() {
        let cc = Congestion::disabled();
        assert_eq!(cc.effective_window(128), DEFAULT_SSTHRESH);
        assert_eq!(cc.effective_window(0), 0);
    }

    proptest! {
        #[test]
        fn prop_cwnd_monotone_without_timeouts(deliveries in 1usize..200) {
            let mut cc = Congestion::new();
            let mut prev = cc.cwnd();
            for _ in 0..deliveries {
                cc.on_chunk_delivered(0);
                // Monotone non-decreasing while no timeout occurs, and
                // capped by ssthresh during slow start
                prop_assert!(cc.cwnd() >= prev);
                if cc.in_slow_start() {
                    prop_assert!(cc.cwnd() <= cc.ssthresh());
                }
                prev = cc.cwnd();
            }
        }

        #[test]
        fn prop_timeout_always_reenters_slow_start_region(
            pattern in prop::collection::vec(any::<bool>(), 1..100)
        ) {
            let mut cc = Congestion::new();
            for lossy in pattern {
                cc.on_chunk_delivered(u64::from(lossy));
                if lossy {
                    prop_assert_eq!(cc.cwnd(), INITIAL_CWND);
                    prop_assert!(cc.ssthresh() >= 1);
                }
            }
        }
    }
}
