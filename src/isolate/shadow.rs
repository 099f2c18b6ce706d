//! Shadow copies of loaded modules.
//!
//! Modules are read from a private staging directory, never from the build
//! output, so the next compile can overwrite or delete the originals while
//! the context is alive. The directory is removed with the context.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use super::ContextId;

pub struct ShadowDir {
    dir: TempDir,
    copied: usize,
}

impl ShadowDir {
    pub fn new(context: ContextId) -> io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("hotview-ctx{}-", context.0))
            .tempdir()?;
        Ok(Self { dir, copied: 0 })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Copy `original` into staging and return the copy's bytes and path.
    ///
    /// The original is read once and closed before this returns.
    pub fn copy_in(&mut self, original: &Path) -> io::Result<(Vec<u8>, PathBuf)> {
        let bytes = fs::read(original)?;
        let file_name = original
            .file_name()
            .map_or_else(|| "module".into(), |n| n.to_string_lossy().into_owned());
        self.copied += 1;
        let copy = self.dir.path().join(format!("{:03}-{file_name}", self.copied));
        fs::write(&copy, &bytes)?;
        Ok((bytes, copy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_original_is_free_after_copy() {
        let out = TempDir::new().unwrap();
        let original = out.path().join("app.pvm");
        fs::write(&original, b"v1").unwrap();

        let mut shadow = ShadowDir::new(ContextId(7)).unwrap();
        let (bytes, copy) = shadow.copy_in(&original).unwrap();
        assert_eq!(bytes, b"v1");
        assert!(copy.starts_with(shadow.path()));

        // The build pipeline may rewrite and delete the original
        fs::write(&original, b"v2").unwrap();
        fs::remove_file(&original).unwrap();
        assert_eq!(fs::read(&copy).unwrap(), b"v1");
    }

    #[test]
    fn test_same_name_twice_gets_distinct_copies() {
        let (a, b) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        fs::write(a.path().join("m.pvm"), b"a").unwrap();
        fs::write(b.path().join("m.pvm"), b"b").unwrap();

        let mut shadow = ShadowDir::new(ContextId(1)).unwrap();
        let (_, first) = shadow.copy_in(&a.path().join("m.pvm")).unwrap();
        let (_, second) = shadow.copy_in(&b.path().join("m.pvm")).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_staging_removed_on_drop() {
        let shadow = ShadowDir::new(ContextId(2)).unwrap();
        let path = shadow.path().to_path_buf();
        assert!(path.is_dir());
        drop(shadow);
        assert!(!path.exists());
    }
}
