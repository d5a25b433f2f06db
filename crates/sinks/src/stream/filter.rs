//! Named event filters
//!
//! A stream writer's `Events[category].Filter` names a predicate from an
//! [`EventFilters`] registry supplied at construction. An empty name accepts
//! every event; an unknown name fails construction.

use crate::WriteRequest;
use spillway_config::ConfigError;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Predicate deciding whether an event is forwarded
pub type EventFilter = Arc<dyn Fn(&WriteRequest) -> bool + Send + Sync>;

/// Registry of filters by name
#[derive(Clone, Default)]
pub struct EventFilters {
    filters: HashMap<String, EventFilter>,
}

impl EventFilters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a filter under `name`, replacing any previous one
    #[must_use]
    pub fn with<F>(mut self, name: impl Into<String>, filter: F) -> Self
    where
        F: Fn(&WriteRequest) -> bool + Send + Sync + 'static,
    {
        self.filters.insert(name.into(), Arc::new(filter));
        self
    }

    /// Look up the filter for a category of `stream`
    ///
    /// `Ok(None)` means accept everything.
    pub fn resolve(&self, stream: &str, name: &str) -> Result<Option<EventFilter>, ConfigError> {
        if name.is_empty() {
            return Ok(None);
        }
        self.filters.get(name).cloned().map(Some).ok_or_else(|| {
            ConfigError::invalid_value("stream", stream, "Filter", format!("unknown filter '{}'", name))
        })
    }
}

impl fmt::Debug for EventFilters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventFilters")
            .field("filters", &self.filters.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_name_accepts_all() {
        let filters = EventFilters::new();
        assert!(filters.resolve("s", "").unwrap().is_none());
    }

    #[test]
    fn test_unknown_name_is_config_error() {
        let filters = EventFilters::new();
        let Err(err) = filters.resolve("downstream", "is-a-bot") else {
            panic!("unknown filter resolved");
        };
        assert!(err.to_string().contains("is-a-bot"));
        assert!(err.to_string().contains("downstream"));
    }

    #[test]
    fn test_registered_filter_applies() {
        let filters = EventFilters::new()
            .with("has-user", |req: &WriteRequest| req.record.contains_key("user"));
        let filter = filters.resolve("s", "has-user").unwrap().unwrap();

        assert!(filter(&WriteRequest::new("c", "l").with_field("user", "1")));
        assert!(!filter(&WriteRequest::new("c", "l")));
    }
}
