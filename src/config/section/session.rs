//! `[session]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [session]
//! debounce_ms = 200        # Quiet time before an edit is built
//! swap_timeout_ms = 5000   # Max wait for a replacement context's first render
//! call_timeout_ms = 10000  # Max wait for any call into a context
//! init_timeout_ms = 30000  # Max wait for a context to load its modules
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub debounce_ms: u64,
    pub swap_timeout_ms: u64,
    pub call_timeout_ms: u64,
    pub init_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 200,
            swap_timeout_ms: 5000,
            call_timeout_ms: 10_000,
            init_timeout_ms: 30_000,
        }
    }
}

impl SessionConfig {
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub const fn swap_timeout(&self) -> Duration {
        Duration::from_millis(self.swap_timeout_ms)
    }

    pub const fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub const fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }
}
