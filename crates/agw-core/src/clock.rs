// SPDX-License-Identifier: MIT OR Apache-2.0
//! Monotonic stopwatch for durations; wall-clock timestamps stay on
//! `chrono` and live directly in the value types.

use std::time::{Duration, Instant};

/// A monotonic stopwatch for measuring phase durations (parse time,
/// normalize time, cold starts).
///
/// Durations come from [`Instant`] differences and are immune to
/// wall-clock adjustments.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    started: Instant,
}

impl Stopwatch {
    /// Start a stopwatch now.
    #[must_use]
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Elapsed time since [`start`](Self::start).
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Elapsed whole milliseconds since [`start`](Self::start).
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// The underlying start instant.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started
    }
}

/// A deadline derived from a timeout, for cooperative cancellation.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// A deadline `timeout` from now.
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now() + timeout,
        }
    }

    /// A deadline at a specific instant.
    #[must_use]
    pub fn at(instant: Instant) -> Self {
        Self { at: instant }
    }

    /// `true` once the deadline has passed.
    #[must_use]
    pub fn expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Time left, or zero when expired.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// The instant the deadline fires.
    #[must_use]
    pub fn instant(&self) -> Instant {
        self.at
    }
}
