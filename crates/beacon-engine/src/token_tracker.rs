//! Token usage accounting for a thread's runs.

use crate::TokenUsage;

/// Cumulative token usage over a set of runs.
#[derive(Debug, Clone, Default)]
pub struct TokenTracker {
    /// Total usage across all recorded runs.
    total: TokenUsage,
    /// Number of runs recorded.
    runs: u64,
}

impl TokenTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker pre-filled with every usage in `runs`.
    pub fn from_runs<'a>(runs: impl IntoIterator<Item = &'a TokenUsage>) -> Self {
        let mut tracker = Self::new();
        for usage in runs {
            tracker.record(usage);
        }
        tracker
    }

    /// Record one run's usage.
    pub fn record(&mut self, usage: &TokenUsage) {
        self.total.input_tokens = self.total.input_tokens.saturating_add(usage.input_tokens);
        self.total.output_tokens = self.total.output_tokens.saturating_add(usage.output_tokens);
        self.runs += 1;
    }

    pub fn total(&self) -> &TokenUsage {
        &self.total
    }

    /// Total tokens (input + output).
    pub fn total_tokens(&self) -> u64 {
        self.total.total_tokens()
    }

    pub fn run_count(&self) -> u64 {
        self.runs
    }

    /// Reset all counters.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
