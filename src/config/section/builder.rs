//! `[builder]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [builder]
//! compiler = ["uic", "--emit", "program"]   # External compiler (default: built-in)
//! code_suffixes = [".ui", ".ui.txt"]
//! markup_suffixes = [".ui.xml", ".xml"]
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Command reading source on stdin and writing a program to stdout.
    pub compiler: Option<Vec<String>>,

    /// File-name suffixes handled by the code builder.
    pub code_suffixes: Vec<String>,

    /// File-name suffixes handled by the markup builder.
    pub markup_suffixes: Vec<String>,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            compiler: None,
            code_suffixes: vec![".ui".into(), ".ui.txt".into()],
            markup_suffixes: vec![".ui.xml".into(), ".xml".into()],
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::test_parse_config;

    #[test]
    fn test_builder_defaults() {
        let config = test_parse_config("");
        assert!(config.builder.compiler.is_none());
        assert!(config.builder.code_suffixes.contains(&".ui".to_string()));
    }

    #[test]
    fn test_builder_compiler() {
        let config = test_parse_config("[builder]\ncompiler = [\"uic\", \"-\"]");
        assert_eq!(
            config.builder.compiler,
            Some(vec!["uic".to_string(), "-".to_string()])
        );
    }
}
