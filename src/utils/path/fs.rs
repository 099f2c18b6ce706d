//! Path normalization utilities.
//!
//! Provides consistent path handling across the codebase:
//! - `normalize_path` - file system paths (canonicalize + fallback)
//! - `resolve_path` - resolve config-relative paths against a root
//! - `dedup_dirs` - order-preserving search-path deduplication

use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;

/// Normalize a file system path to absolute form.
///
/// Tries `canonicalize()` first (resolves symlinks, `.`, `..`).
/// Falls back to:
/// - Return as-is if already absolute
/// - Join with current directory if relative
#[inline]
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
        }
    })
}

/// Resolve a path that may be relative to `root`.
///
/// `~` is expanded first; absolute paths are kept as-is.
#[inline]
pub fn resolve_path(path: &Path, root: &Path) -> PathBuf {
    let expanded = expand_path(path);
    if expanded.is_absolute() {
        return normalize_path(&expanded);
    }
    normalize_path(&root.join(expanded))
}

/// Expand a leading `~` to the home directory.
fn expand_path(path: &Path) -> PathBuf {
    let Some(text) = path.to_str() else {
        return path.to_path_buf();
    };
    PathBuf::from(shellexpand::tilde(text).as_ref())
}

/// Directory containing the running executable.
pub fn host_dir() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    exe.parent().map(Path::to_path_buf)
}

/// Deduplicate directories, keeping the first occurrence of each.
pub fn dedup_dirs<I>(dirs: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut seen = FxHashSet::default();
    dirs.into_iter()
        .filter(|dir| seen.insert(normalize_path(dir)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_absolute() {
        let path = Path::new("/absolute/path/file.txt");
        let normalized = normalize_path(path);
        assert!(normalized.is_absolute());
    }

    #[test]
    fn test_normalize_path_relative() {
        let path = Path::new("relative/path/file.txt");
        let normalized = normalize_path(path);
        assert!(normalized.is_absolute());
    }

    #[test]
    fn test_resolve_path_absolute() {
        let resolved = resolve_path(Path::new("/absolute/path"), Path::new("/root"));
        assert_eq!(resolved, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_resolve_path_relative_to_root() {
        let resolved = resolve_path(Path::new("out/app.pvm"), Path::new("/nonexistent-root"));
        assert_eq!(resolved, PathBuf::from("/nonexistent-root/out/app.pvm"));
    }

    #[test]
    fn test_dedup_dirs_keeps_first() {
        let dirs = vec![
            PathBuf::from("/a"),
            PathBuf::from("/b"),
            PathBuf::from("/a"),
            PathBuf::from("/c"),
            PathBuf::from("/b"),
        ];
        assert_eq!(
            dedup_dirs(dirs),
            vec![PathBuf::from("/a"), PathBuf::from("/b"), PathBuf::from("/c")]
        );
    }
}
