//! Compiled UI modules and the per-context module table.
//!
//! A module file (`*.pvm`) is a JSON image:
//!
//! ```json
//! { "format": 1, "name": "widgets", "references": ["base"],
//!   "controls": [{ "name": "Banner", "base": "Label", "padding": 4 }] }
//! ```

use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::error::ResolveError;
use super::resolver::Resolvers;
use super::shadow::ShadowDir;
use crate::control::ControlType;
use crate::utils::hash::ContentHash;

/// Extension of compiled module files.
pub const MODULE_EXT: &str = "pvm";

/// Image format this host understands.
pub const MODULE_FORMAT: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleImage {
    pub format: u32,
    pub name: String,
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default)]
    pub controls: Vec<ControlType>,
}

impl ModuleImage {
    pub fn parse(bytes: &[u8], path: &Path) -> Result<Self, ResolveError> {
        let load_error = |reason: String| ResolveError::Load {
            path: path.to_path_buf(),
            reason,
        };
        let image: Self = serde_json::from_slice(bytes).map_err(|e| load_error(e.to_string()))?;
        if image.format != MODULE_FORMAT {
            return Err(load_error(format!(
                "unsupported module format {} (expected {MODULE_FORMAT})",
                image.format
            )));
        }
        if image.name.is_empty() {
            return Err(load_error("module has no name".into()));
        }
        Ok(image)
    }
}

#[derive(Debug)]
pub struct LoadedModule {
    pub image: ModuleImage,
    /// Where the module was found
    pub origin: PathBuf,
    /// Private copy actually loaded
    pub shadow: PathBuf,
    pub hash: ContentHash,
}

/// Modules loaded into one context, in dependency order.
#[derive(Debug, Default)]
pub struct ModuleTable {
    modules: Vec<LoadedModule>,
    by_name: FxHashMap<String, usize>,
}

impl ModuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Referenced modules come before the modules referencing them.
    pub fn iter(&self) -> impl Iterator<Item = &LoadedModule> {
        self.modules.iter()
    }

    /// Load `path` and, through `resolvers`, everything it references.
    pub fn load_file(
        &mut self,
        path: &Path,
        shadow: &mut ShadowDir,
        resolvers: &Resolvers,
    ) -> Result<&LoadedModule, ResolveError> {
        if !path.is_file() {
            return Err(ResolveError::NotFound {
                name: path.display().to_string(),
                searched: path.parent().map(Path::to_path_buf).into_iter().collect(),
            });
        }
        let mut loading = Vec::new();
        let index = self.load(path, shadow, resolvers, &mut loading)?;
        Ok(&self.modules[index])
    }

    fn load(
        &mut self,
        path: &Path,
        shadow: &mut ShadowDir,
        resolvers: &Resolvers,
        loading: &mut Vec<String>,
    ) -> Result<usize, ResolveError> {
        let (bytes, copy) = shadow.copy_in(path).map_err(|e| ResolveError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let image = ModuleImage::parse(&bytes, path)?;

        if let Some(&index) = self.by_name.get(&image.name) {
            return Ok(index);
        }
        if loading.contains(&image.name) {
            return Err(ResolveError::Cycle(image.name));
        }

        loading.push(image.name.clone());
        for reference in &image.references {
            if self.by_name.contains_key(reference) {
                continue;
            }
            if loading.contains(reference) {
                return Err(ResolveError::Cycle(reference.clone()));
            }
            let found = resolvers
                .resolve(reference)
                .ok_or_else(|| ResolveError::NotFound {
                    name: reference.clone(),
                    searched: resolvers.searched(),
                })?;
            self.load(&found, shadow, resolvers, loading)?;
        }
        loading.pop();

        let index = self.modules.len();
        self.by_name.insert(image.name.clone(), index);
        self.modules.push(LoadedModule {
            image,
            origin: path.to_path_buf(),
            shadow: copy,
            hash: ContentHash::of(&bytes),
        });
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isolate::ContextId;
    use std::fs;
    use tempfile::TempDir;

    fn write_module(dir: &Path, name: &str, references: &[&str]) -> PathBuf {
        let image = ModuleImage {
            format: MODULE_FORMAT,
            name: name.to_string(),
            references: references.iter().map(|r| r.to_string()).collect(),
            controls: Vec::new(),
        };
        let path = dir.join(format!("{name}.{MODULE_EXT}"));
        fs::write(&path, serde_json::to_vec(&image).unwrap()).unwrap();
        path
    }

    fn setup() -> (TempDir, ShadowDir, std::sync::Arc<Resolvers>) {
        let dir = TempDir::new().unwrap();
        let shadow = ShadowDir::new(ContextId(0)).unwrap();
        (dir, shadow, Resolvers::new())
    }

    #[test]
    fn test_references_load_first() {
        let (dir, mut shadow, resolvers) = setup();
        write_module(dir.path(), "base", &[]);
        write_module(dir.path(), "widgets", &["base"]);
        let app = write_module(dir.path(), "app", &["widgets", "base"]);

        let _guard = resolvers.register(vec![dir.path().to_path_buf()]);
        let mut table = ModuleTable::new();
        table.load_file(&app, &mut shadow, &resolvers).unwrap();

        let order: Vec<_> = table.iter().map(|m| m.image.name.as_str()).collect();
        assert_eq!(order, ["base", "widgets", "app"]);
    }

    #[test]
    fn test_missing_reference() {
        let (dir, mut shadow, resolvers) = setup();
        let app = write_module(dir.path(), "app", &["ghost"]);

        let _guard = resolvers.register(vec![dir.path().to_path_buf()]);
        let err = ModuleTable::new()
            .load_file(&app, &mut shadow, &resolvers)
            .unwrap_err();
        assert!(matches!(err, ResolveError::NotFound { ref name, ref searched }
            if name == "ghost" && searched.len() == 1));
    }

    #[test]
    fn test_corrupt_reference_propagates() {
        let (dir, mut shadow, resolvers) = setup();
        let app = write_module(dir.path(), "app", &["broken"]);
        fs::write(dir.path().join("broken.pvm"), b"\x00\x01not json").unwrap();

        let _guard = resolvers.register(vec![dir.path().to_path_buf()]);
        let err = ModuleTable::new()
            .load_file(&app, &mut shadow, &resolvers)
            .unwrap_err();
        assert!(matches!(err, ResolveError::Load { ref path, .. } if path.ends_with("broken.pvm")));
    }

    #[test]
    fn test_wrong_format_is_load_error() {
        let bytes = br#"{"format": 2, "name": "app"}"#;
        let err = ModuleImage::parse(bytes, Path::new("app.pvm")).unwrap_err();
        let ResolveError::Load { reason, .. } = err else {
            panic!("expected a load error");
        };
        assert!(reason.contains("format 2"), "{reason}");
    }

    #[test]
    fn test_cycle_detected() {
        let (dir, mut shadow, resolvers) = setup();
        write_module(dir.path(), "a", &["b"]);
        let b = write_module(dir.path(), "b", &["a"]);

        let _guard = resolvers.register(vec![dir.path().to_path_buf()]);
        let err = ModuleTable::new()
            .load_file(&b, &mut shadow, &resolvers)
            .unwrap_err();
        assert!(matches!(err, ResolveError::Cycle(_)));
    }

    #[test]
    fn test_loaded_twice_is_shared() {
        let (dir, mut shadow, resolvers) = setup();
        let base = write_module(dir.path(), "base", &[]);

        let mut table = ModuleTable::new();
        table.load_file(&base, &mut shadow, &resolvers).unwrap();
        table.load_file(&base, &mut shadow, &resolvers).unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.iter().any(|module| module.image.name == "base"));
    }
}
