//! Scope-guard timer injected at the top of every instrumented function
//!
//! # Example
//!
//! ```
//! use wcprof::{Registry, Timer};
//!
//! let registry = Registry::new();
//! {
//!     let _timer = Timer::start_in(&registry, "example/work");
//!     // ... do work ...
//! } // elapsed time is recorded here
//!
//! assert_eq!(registry.get("example/work").unwrap().count, 1);
//! ```

use std::borrow::Cow;
use std::time::{Duration, Instant};

use crate::registry::{self, Registry};

/// Wall-clock timer for one function invocation
///
/// The timer reports its `(label, duration)` sample exactly once: on the first
/// call to [`Timer::stop`], or when dropped if it was never stopped. A timer
/// started while the registry is disabled is a no-op sentinel that never reads
/// the clock.
#[derive(Debug)]
pub struct Timer<'r> {
    label: Cow<'static, str>,
    start: Option<Instant>,
    end: Option<Instant>,
    registry: Option<&'r Registry>,
}

impl Timer<'static> {
    /// Start a timer that reports to the global registry
    pub fn start(label: impl Into<Cow<'static, str>>) -> Self {
        Timer::start_in(registry::global(), label)
    }
}

impl<'r> Timer<'r> {
    /// Start a timer that reports to `registry`
    pub fn start_in(registry: &'r Registry, label: impl Into<Cow<'static, str>>) -> Self {
        if !registry.is_enabled() {
            return Self {
                label: label.into(),
                start: None,
                end: None,
                registry: None,
            };
        }

        Self {
            label: label.into(),
            start: Some(Instant::now()),
            end: None,
            registry: Some(registry),
        }
    }

    /// Stop the timer and record the sample
    ///
    /// Returns the measured duration on the first call and `None` afterwards,
    /// or always `None` for a disabled timer.
    pub fn stop(&mut self) -> Option<Duration> {
        let registry = self.registry.take()?;
        let start = self.start?;
        let end = Instant::now();
        self.end = Some(end);

        let elapsed = end.duration_since(start);
        registry.record(&self.label, elapsed);
        Some(elapsed)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.start
    }

    pub fn stopped_at(&self) -> Option<Instant> {
        self.end
    }

    /// True until the sample has been recorded (always false when disabled)
    pub fn is_active(&self) -> bool {
        self.registry.is_some()
    }

    /// Time between start and stop, or start and now while still running
    pub fn elapsed(&self) -> Duration {
        match (self.start, self.end) {
            (Some(start), Some(end)) => end.duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        }
    }
}

impl Drop for Timer<'_> {
    fn drop(&mut self) {
        self.stop();
    }
}
