// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Time sources for request deadlines and bounded startup waits.
//!
//! The RPC core never reads the wall clock directly; all timing goes through
//! the [`TimeSource`] trait so tests can drive deadlines deterministically.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Monotonic microsecond clock abstraction.
///
/// The epoch is arbitrary but fixed for the lifetime of the source; only
/// differences between readings are meaningful.
pub trait TimeSource: Send + Sync {
    /// Current time in microseconds since the source's epoch.
    fn now_usec(&self) -> u64;

    /// Block the calling thread for `duration`.
    ///
    /// The only places the core sleeps are the bounded wait for transports
    /// to report running and the demo poll loops.
    fn sleep(&self, duration: Duration);
}

/// Time source backed by [`std::time::Instant`] (epoch = construction).
pub struct MonotonicTimeSource {
    epoch: Instant,
}

impl MonotonicTimeSource {
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonotonicTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicTimeSource {
    fn now_usec(&self) -> u64 {
        // u64 microseconds cover ~584k years from the epoch; truncation is fine.
        self.epoch.elapsed().as_micros() as u64
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Manually advanced time source for deterministic tests.
///
/// `sleep` advances the clock instead of blocking, so timeout paths can be
/// exercised without real waiting.
pub struct ManualTimeSource {
    now_usec: AtomicU64,
}

impl ManualTimeSource {
    #[must_use]
    pub fn new() -> Self {
        Self {
            now_usec: AtomicU64::new(0),
        }
    }

    /// Advance the clock by `usec` microseconds.
    pub fn advance(&self, usec: u64) {
        self.now_usec.fetch_add(usec, Ordering::SeqCst);
    }
}

impl Default for ManualTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for ManualTimeSource {
    fn now_usec(&self) -> u64 {
        self.now_usec.load(Ordering::SeqCst)
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration.as_micros() as u64);
    }
}
