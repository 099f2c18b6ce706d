//! `[watch]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [watch]
//! extensions = ["pvm"]   # Compiled output files that trigger a reload
//! debounce_ms = 300      # Burst of writes collapsed into one reload
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// File extensions (without the dot) that count as compiled output.
    pub extensions: Vec<String>,

    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            extensions: vec![crate::isolate::MODULE_EXT.to_string()],
            debounce_ms: 300,
        }
    }
}

impl WatchConfig {
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
