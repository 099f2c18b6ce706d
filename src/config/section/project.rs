//! `[project]` section configuration.
//!
//! Describes what an isolation context loads.
//!
//! # Example
//!
//! ```toml
//! [project]
//! platform = "gtk"                      # Toolkit attached inside each context
//! output = "target/ui/app.pvm"          # Main compiled output (watched)
//! dependencies = ["libs/widgets.pvm"]   # Loaded before the main output
//! search_dirs = ["~/.hotview/modules"]  # Extra reference lookup directories
//! ```
//!
//! Relative paths are resolved against the directory holding `preview.toml`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Platform descriptor for the toolkit attachment.
    pub platform: String,

    /// Main compiled output; without one, only builtin types are available.
    pub output: Option<PathBuf>,

    /// Modules loaded ahead of the main output, in order.
    pub dependencies: Vec<PathBuf>,

    /// Directories searched for referenced modules after the defaults.
    pub search_dirs: Vec<PathBuf>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            platform: "headless".to_string(),
            output: None,
            dependencies: Vec::new(),
            search_dirs: Vec::new(),
        }
    }
}
