//! Node configuration.
//!
//! ```
//! use covalent::node::NodeConfig;
//! use covalent::MaterializationStrategy;
//!
//! let config = NodeConfig::from_json(r#"{"materialization": "lazy", "gapWindowMs": 500}"#).unwrap();
//! assert_eq!(config.materialization, MaterializationStrategy::Lazy);
//! assert_eq!(config.sync.max_attempts, 5);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::constants::DEFAULT_GAP_WINDOW_MS;
use crate::materialize::MaterializationStrategy;

/// Retry policy for unreachable sync peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncConfig {
    /// Sends attempted per request before the peer is reported unreachable.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 5_000,
        }
    }
}

impl SyncConfig {
    /// Delay after the `attempt`-th failure (1-based), doubling up to the cap.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(32);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

/// Settings for a [`Node`](super::Node).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeConfig {
    pub materialization: MaterializationStrategy,
    /// How long a transaction may wait for its predecessor before the gap is reported.
    pub gap_window_ms: u64,
    pub sync: SyncConfig,
    /// Overrides the key provider's device id in session ids.
    pub device_id: Option<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            materialization: MaterializationStrategy::default(),
            gap_window_ms: DEFAULT_GAP_WINDOW_MS,
            sync: SyncConfig::default(),
            device_id: None,
        }
    }
}

impl NodeConfig {
    /// Parse configuration kept as JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_materialization(mut self, strategy: MaterializationStrategy) -> Self {
        self.materialization = strategy;
        self
    }
}
