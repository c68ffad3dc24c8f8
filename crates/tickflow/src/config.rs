//! Engine configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Minimum number of resolver queues: light, heavy and async.
pub const MIN_PRIORITY_CLASSES: usize = 3;

/// Tunables for a [`Graph`](crate::Graph).
///
/// Read from TOML; every field is optional.
///
/// ```toml
/// strict = true
/// priority_classes = 4
/// max_rounds = 32
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Panic on access to destroyed blocks and properties instead of
    /// degrading to a no-op.
    pub strict: bool,
    /// Number of resolver priority queues.
    pub priority_classes: usize,
    /// Default bound for [`Graph::run_all`](crate::Graph::run_all).
    pub max_rounds: usize,
    /// Nested delivery depth at which propagation is cut (binding cycles).
    pub max_dispatch_depth: usize,
    /// Undo snapshots kept per flow.
    pub history_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strict: false,
            priority_classes: MIN_PRIORITY_CLASSES,
            max_rounds: 64,
            max_dispatch_depth: 512,
            history_limit: 50,
        }
    }
}

impl EngineConfig {
    /// Config for tests: destroyed access panics.
    pub fn strict() -> Self {
        Self { strict: true, ..Self::default() }
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(text)?;
        Ok(config.normalized())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    fn normalized(mut self) -> Self {
        self.priority_classes = self.priority_classes.max(MIN_PRIORITY_CLASSES);
        self.max_dispatch_depth = self.max_dispatch_depth.max(1);
        self
    }
}
