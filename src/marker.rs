//! Sentinel comments recording instrumentation state in the source itself
//!
//! A function is left alone when one of its leading comments contains
//! [`MARKER`] (already instrumented) or [`MARKER_OFF`] (excluded by hand).
//! Only these exact substrings matter; any other comment text is ignored.

/// Added above every function that received a probe
pub const MARKER: &str = "// wcprof: MARKED";

/// Written by hand above a function that must never be instrumented
pub const MARKER_OFF: &str = "// wcprof: OFF";

/// Instrumentation state of one function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerState {
    /// No marker, eligible for a probe
    Unmarked,
    /// Already carries a probe from an earlier pass
    Marked,
    /// Explicitly excluded
    Off,
}

impl MarkerState {
    pub fn is_eligible(self) -> bool {
        self == MarkerState::Unmarked
    }
}

/// State of a single comment
pub fn classify(comment: &str) -> MarkerState {
    if comment.contains(MARKER) {
        MarkerState::Marked
    } else if comment.contains(MARKER_OFF) {
        MarkerState::Off
    } else {
        MarkerState::Unmarked
    }
}

/// Resolve the state from a function's leading comments
///
/// The first comment carrying either marker decides.
pub fn resolve<'a, I>(comments: I) -> MarkerState
where
    I: IntoIterator<Item = &'a str>,
{
    comments
        .into_iter()
        .map(classify)
        .find(|state| *state != MarkerState::Unmarked)
        .unwrap_or(MarkerState::Unmarked)
}
