//! Preview configuration management for `preview.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section/       # Configuration section definitions
//! │   ├── builder    # [builder]
//! │   ├── project    # [project]
//! │   ├── session    # [session]
//! │   └── watch      # [watch]
//! ├── error          # ConfigError
//! ├── util           # Config file discovery
//! └── mod.rs         # PreviewConfig (this file)
//! ```
//!
//! The config governing a source file is the nearest `preview.toml` found by
//! walking upward from the file's directory. Without one, defaults apply and
//! the file's directory is the project root.

mod error;
pub mod section;
mod util;

pub use error::ConfigError;
pub use section::{BuilderConfig, ProjectConfig, SessionConfig, WatchConfig};
pub use util::find_config_file;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::control::PLATFORMS;
use crate::log;
use crate::utils::path::{normalize_path, resolve_path};

/// Default config file name.
pub const CONFIG_FILE: &str = "preview.toml";

/// Root configuration structure representing preview.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreviewConfig {
    /// Absolute path to the config file, if one was found (internal use only)
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// Project root directory (internal use only)
    #[serde(skip)]
    pub root: PathBuf,

    #[serde(default)]
    pub project: ProjectConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub builder: BuilderConfig,
}

impl PreviewConfig {
    /// Load the configuration governing `source`.
    ///
    /// `explicit` (from `--config`) skips the upward search and must exist.
    pub fn load(source: &Path, explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let source = normalize_path(source);
        let start = source
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let config_path = match explicit {
            Some(path) => {
                let path = normalize_path(path);
                if !path.is_file() {
                    return Err(ConfigError::Io(
                        path,
                        std::io::Error::new(std::io::ErrorKind::NotFound, "config file not found"),
                    ));
                }
                Some(path)
            }
            None => find_config_file(Path::new(CONFIG_FILE), &start),
        };

        let mut config = match &config_path {
            Some(path) => Self::from_path(path)?,
            None => Self::default(),
        };

        let root = config_path
            .as_deref()
            .and_then(Path::parent)
            .map_or(start, Path::to_path_buf);
        config.config_path = config_path;
        config.finalize(&root);
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file path with unknown field detection.
    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)
            .map_err(|err| ConfigError::Toml(path.to_path_buf(), err))?;

        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }

        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), toml::de::Error> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        log!("warning"; "unknown fields in {}, ignoring:", path.display());
        for field in fields {
            eprintln!("- {field}");
        }
    }

    /// Anchor every configured path at `root`.
    fn finalize(&mut self, root: &Path) {
        self.root = root.to_path_buf();
        let project = &mut self.project;
        project.output = project.output.as_deref().map(|p| resolve_path(p, root));
        for path in project
            .dependencies
            .iter_mut()
            .chain(project.search_dirs.iter_mut())
        {
            *path = resolve_path(path, root);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !PLATFORMS.contains(&self.project.platform.as_str()) {
            return Err(ConfigError::Validation(format!(
                "[project] platform `{}` is not one of: {}",
                self.project.platform,
                PLATFORMS.join(", ")
            )));
        }
        if let Some(command) = &self.builder.compiler
            && command.is_empty()
        {
            return Err(ConfigError::Validation(
                "[builder] compiler must name a command".into(),
            ));
        }
        if self.watch.extensions.is_empty() {
            return Err(ConfigError::Validation(
                "[watch] extensions must not be empty".into(),
            ));
        }
        if self.session.call_timeout_ms == 0 || self.session.init_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "[session] timeouts must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Override the platform from the command line.
    pub fn with_platform(mut self, platform: Option<&str>) -> Result<Self, ConfigError> {
        if let Some(platform) = platform {
            self.project.platform = platform.to_string();
            self.validate()?;
        }
        Ok(self)
    }

    /// Directory holding the main compiled output.
    pub fn output_dir(&self) -> Option<&Path> {
        self.project.output.as_deref()?.parent()
    }
}

/// Parse a config snippet, failing on unknown fields.
#[cfg(test)]
pub fn test_parse_config(content: &str) -> PreviewConfig {
    let (parsed, ignored) = PreviewConfig::parse_with_ignored(content).unwrap();
    assert!(
        ignored.is_empty(),
        "test config has unknown fields: {:?}",
        ignored
    );
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_unknown_fields_are_collected() {
        let (_, ignored) =
            PreviewConfig::parse_with_ignored("[project]\nplatfrom = \"gtk\"\n[extra]\na = 1")
                .unwrap();
        assert_eq!(ignored, vec!["project.platfrom".to_string(), "extra".to_string()]);
    }

    #[test]
    fn test_load_without_config_uses_source_dir() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("view.ui");
        fs::write(&source, "").unwrap();

        let config = PreviewConfig::load(&source, None).unwrap();
        assert!(config.config_path.is_none());
        assert_eq!(config.root, normalize_path(dir.path()));
        assert_eq!(config.project.platform, "headless");
    }

    #[test]
    fn test_load_resolves_paths_against_config_dir() {
        let dir = TempDir::new().unwrap();
        let views = dir.path().join("views");
        fs::create_dir_all(&views).unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            "[project]\noutput = \"out/app.pvm\"\ndependencies = [\"libs/w.pvm\"]",
        )
        .unwrap();
        let source = views.join("main.ui");
        fs::write(&source, "").unwrap();

        let config = PreviewConfig::load(&source, None).unwrap();
        let root = normalize_path(dir.path());
        assert_eq!(config.root, root);
        assert_eq!(config.project.output, Some(root.join("out/app.pvm")));
        assert_eq!(config.project.dependencies, vec![root.join("libs/w.pvm")]);
        assert_eq!(config.output_dir(), Some(root.join("out").as_path()));
    }

    #[test]
    fn test_load_rejects_unknown_platform() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "[project]\nplatform = \"amiga\"").unwrap();
        let source = dir.path().join("main.ui");

        let err = PreviewConfig::load(&source, None).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_load_reports_toml_errors() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "[project\n").unwrap();
        let err = PreviewConfig::load(&dir.path().join("main.ui"), None).unwrap_err();
        assert!(matches!(err, ConfigError::Toml(..)));
    }

    #[test]
    fn test_explicit_config_must_exist() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("other.toml");
        let err = PreviewConfig::load(&dir.path().join("main.ui"), Some(&missing)).unwrap_err();
        assert!(matches!(err, ConfigError::Io(..)));
    }

    #[test]
    fn test_with_platform_override() {
        let config = PreviewConfig::default();
        assert_eq!(
            config.clone().with_platform(Some("wpf")).unwrap().project.platform,
            "wpf"
        );
        assert!(config.with_platform(Some("amiga")).is_err());
    }
}
