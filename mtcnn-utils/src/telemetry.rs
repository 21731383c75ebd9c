//! Lightweight timing utilities for optional performance tracing.
//!
//! Provides a simple RAII guard that records the elapsed duration of a scoped
//! operation and logs it when the guard is dropped. Logging only occurs when
//! the requested log level is enabled, keeping the overhead negligible when
//! tracing is disabled.

use std::{
    borrow::Cow,
    time::{Duration, Instant},
};

use log::{Level, log, log_enabled};

/// RAII helper that logs how long an operation took when dropped.
///
/// Guards are usually created via [`timing_guard`] so most callers do not
/// need to interact with this type directly.
pub struct TimingGuard {
    label: Cow<'static, str>,
    level: Level,
    start: Instant,
    active: bool,
}

impl TimingGuard {
    fn new(label: Cow<'static, str>, level: Level, active: bool) -> Self {
        Self {
            label,
            level,
            start: Instant::now(),
            active,
        }
    }

    /// Returns `true` when the guard will emit a log entry on drop.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Returns the elapsed duration since the guard was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Consume the guard and return the elapsed duration without logging.
    pub fn finish(mut self) -> Duration {
        let duration = self.start.elapsed();
        self.active = false;
        duration
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        if self.active {
            let duration = self.start.elapsed();
            log!(
                target: "mtcnn::telemetry",
                self.level,
                "{} completed in {:.2?}",
                self.label,
                duration
            );
        }
    }
}

/// Create a timing guard that logs at the provided level when that level is enabled.
///
/// Logging only occurs when the global logger allows the provided level (e.g.
/// via `RUST_LOG=mtcnn=debug`).
pub fn timing_guard(label: impl Into<Cow<'static, str>>, level: Level) -> TimingGuard {
    let label = label.into();
    let active = log_enabled!(target: "mtcnn::telemetry", level);
    TimingGuard::new(label, level, active)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_returns_elapsed_without_logging() {
        let guard = timing_guard("test_op", Level::Trace);
        let elapsed = guard.finish();
        assert!(elapsed <= Duration::from_secs(1));
    }
}
