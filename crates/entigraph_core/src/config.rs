//! Transmitter configuration.

use crate::error::SyncResult;
use crate::policy::MappingPolicy;
use serde::Deserialize;

/// Configuration for a [`Transmitter`](crate::Transmitter).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TransmitterConfig {
    /// Operation-level policy used by the typed `load_entity` and
    /// `save_entity` entry points.
    pub default_policy: MappingPolicy,

    /// Whether tracked node records that buffer writes are flushed after
    /// properties and before associations are written.
    pub flush_tracked_nodes: bool,
}

impl Default for TransmitterConfig {
    fn default() -> Self {
        Self {
            default_policy: MappingPolicy::DEFAULT,
            flush_tracked_nodes: true,
        }
    }
}

impl TransmitterConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from JSON. Missing fields take defaults.
    pub fn from_json(json: &str) -> SyncResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Sets the default operation-level policy.
    #[must_use]
    pub const fn default_policy(mut self, policy: MappingPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    /// Sets whether tracked node records are flushed before associations.
    #[must_use]
    pub const fn flush_tracked_nodes(mut self, value: bool) -> Self {
        self.flush_tracked_nodes = value;
        self
    }
}
