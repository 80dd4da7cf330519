//! Elapsed time measurement for log output.

use std::time::{Duration, Instant};

/// Measures elapsed time on the monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct StopWatch {
    start: Instant,
}

impl StopWatch {
    /// Starts measuring now.
    #[must_use]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Restarts the measurement.
    pub fn reset(&mut self) {
        self.start = Instant::now();
    }

    /// Time since start.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Nanoseconds since start, saturating at `u64::MAX`.
    #[must_use]
    pub fn elapsed_nanos(&self) -> u64 {
        u64::try_from(self.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    /// Whole milliseconds since start.
    #[must_use]
    pub fn elapsed_millis(&self) -> u64 {
        u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Time since start, formatted like "5 ms", "0.03 ms" or "987 ns".
    #[must_use]
    pub fn duration_for_log(&self) -> String {
        duration_for_log(self.elapsed_nanos())
    }
}

impl Default for StopWatch {
    fn default() -> Self {
        Self::start()
    }
}

/// Formats a duration with a unit fitting its magnitude, rounding to the
/// nearest displayed digit.
pub fn duration_for_log(nanos: u64) -> String {
    const MILLI: u64 = 1_000_000;
    const SECOND: u64 = 1_000 * MILLI;

    if nanos >= 10 * SECOND {
        format!("{} s", nanos.saturating_add(SECOND / 2) / SECOND)
    } else if nanos >= 10 * MILLI {
        format!("{} ms", (nanos + MILLI / 2) / MILLI)
    } else if nanos >= 10_000 {
        let hundredths = (nanos + 5_000) / 10_000;
        format!("{}.{:02} ms", hundredths / 100, hundredths % 100)
    } else {
        format!("{nanos} ns")
    }
}
