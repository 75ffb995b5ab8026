//! Runtime configuration.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How a pending flush gets executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushMode {
    /// The embedding event loop calls [`Runtime::flush`](crate::Runtime::flush)
    /// once its synchronous turn is over.
    #[default]
    Manual,

    /// A flush task is spawned with `tokio::task::spawn_local` when the first
    /// job of a batch is enqueued. Requires a running `tokio::task::LocalSet`.
    LocalTask,
}

/// Configuration for a [`Runtime`](crate::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// How flushes are driven.
    pub flush_mode: FlushMode,

    /// Drain the retired-container queue after every flush.
    pub collect_garbage_on_flush: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            flush_mode: FlushMode::Manual,
            collect_garbage_on_flush: true,
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    /// Builder-style setter for the flush mode.
    pub fn with_flush_mode(mut self, flush_mode: FlushMode) -> Self {
        self.flush_mode = flush_mode;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config = RuntimeConfig::from_json(r#"{ "flush_mode": "local_task" }"#).unwrap();
        assert_eq!(config.flush_mode, FlushMode::LocalTask);
        assert!(config.collect_garbage_on_flush);
    }

    #[test]
    fn empty_object_is_default() {
        let config = RuntimeConfig::from_json("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn rejects_unknown_flush_mode() {
        assert!(RuntimeConfig::from_json(r#"{ "flush_mode": "eager" }"#).is_err());
    }
}
