//! Metrics provider traits
//!
//! Writers differ in what they count (a batcher counts flushes, a stream
//! writer counts per-record failures), so a snapshot is an ordered list of
//! named counters rather than a fixed struct.

/// Point-in-time snapshot of a writer's counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterMetricsSnapshot {
    counters: Vec<(&'static str, u64)>,
}

impl WriterMetricsSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a named counter
    #[must_use]
    pub fn with(mut self, name: &'static str, value: u64) -> Self {
        self.counters.push((name, value));
        self
    }

    /// Look up a counter by name
    pub fn get(&self, name: &str) -> Option<u64> {
        self.counters
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        self.counters.iter().copied()
    }

    /// Render as `name=value` pairs, with the increase since `previous`
    /// in parentheses when it is non-zero
    pub fn format(&self, previous: Option<&WriterMetricsSnapshot>) -> String {
        self.counters
            .iter()
            .map(|(name, value)| {
                let delta = previous
                    .and_then(|p| p.get(name))
                    .map(|prev| value.saturating_sub(prev))
                    .unwrap_or(0);
                if delta > 0 {
                    format!("{}={} (+{})", name, value, delta)
                } else {
                    format!("{}={}", name, value)
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Trait for writers to provide metrics to the reporter
///
/// The `snapshot()` method is the main requirement - it returns a copy of
/// the current counters that can be safely used for reporting.
pub trait WriterMetricsProvider: Send + Sync {
    /// Unique identifier for this writer instance
    fn writer_id(&self) -> &str;

    /// Writer type (e.g., "stream", "batcher", "controller")
    fn writer_type(&self) -> &str;

    /// Get a snapshot of current metrics
    fn snapshot(&self) -> WriterMetricsSnapshot;
}
