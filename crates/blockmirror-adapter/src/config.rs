//! Adapter configuration. Plain serde struct — the embedding process owns
//! where it comes from (CLI, file, environment).

use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_poll_period_ms() -> u64 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Device hostname or address, handed to the protocol client.
    pub hostname: String,
    /// Synchronization poll period in milliseconds.
    #[serde(default = "default_poll_period_ms")]
    pub poll_period_ms: u64,
    /// Namespace prefix for the scoped (external) address rendering.
    #[serde(default)]
    pub prefix: Option<String>,
}

impl MirrorConfig {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            poll_period_ms: default_poll_period_ms(),
            prefix: None,
        }
    }

    pub fn poll_period(&self) -> Duration {
        Duration::from_millis(self.poll_period_ms)
    }
}
