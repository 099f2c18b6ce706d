//! Scoped, stackable module resolvers.
//!
//! A registered hook maps a module name to `<dir>/<name>.pvm` for the first
//! search directory where that file exists. Hooks are consulted newest first
//! and stop answering the moment their guard is released, in any order.
//! Resolution only ever reads the file system.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::module::MODULE_EXT;

struct Hook {
    id: u64,
    dirs: Vec<PathBuf>,
}

/// Resolver stack private to one isolation context.
#[derive(Default)]
pub struct Resolvers {
    hooks: Mutex<Vec<Hook>>,
    next_id: AtomicU64,
}

impl Resolvers {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Install a hook searching `dirs` in order.
    pub fn register(self: &Arc<Self>, dirs: Vec<PathBuf>) -> ResolverGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.hooks.lock().push(Hook { id, dirs });
        ResolverGuard {
            owner: Arc::downgrade(self),
            id,
            released: false,
        }
    }

    /// Path of the module `name`, or `None` when every hook declines.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        if !is_plain_name(name) {
            return None;
        }
        let file_name = format!("{name}.{MODULE_EXT}");
        let hooks = self.hooks.lock();
        hooks
            .iter()
            .rev()
            .flat_map(|hook| hook.dirs.iter())
            .map(|dir| dir.join(&file_name))
            .find(|candidate| candidate.is_file())
    }

    /// Every directory an unsuccessful `resolve` looked in.
    pub fn searched(&self) -> Vec<PathBuf> {
        let hooks = self.hooks.lock();
        hooks.iter().rev().flat_map(|hook| hook.dirs.clone()).collect()
    }

    fn remove(&self, id: u64) {
        self.hooks.lock().retain(|hook| hook.id != id);
    }
}

/// Names are single path components.
fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

/// Keeps a hook installed until released or dropped.
pub struct ResolverGuard {
    owner: Weak<Resolvers>,
    id: u64,
    released: bool,
}

impl ResolverGuard {
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if std::mem::replace(&mut self.released, true) {
            return;
        }
        if let Some(owner) = self.owner.upgrade() {
            owner.remove(self.id);
        }
    }
}

impl Drop for ResolverGuard {
    fn drop(&mut self) {
        self.remove();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn module_in(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(format!("{name}.pvm"));
        fs::write(&path, "{}").unwrap();
        path
    }

    #[test]
    fn test_first_existing_dir_wins() {
        let (a, b) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        module_in(&b, "widgets");
        let expected = module_in(&a, "widgets");

        let resolvers = Resolvers::new();
        let _guard = resolvers.register(vec![a.path().into(), b.path().into()]);
        assert_eq!(resolvers.resolve("widgets"), Some(expected));
        assert_eq!(resolvers.resolve("missing"), None);
    }

    #[test]
    fn test_release_stops_interception() {
        let dir = TempDir::new().unwrap();
        module_in(&dir, "widgets");

        let resolvers = Resolvers::new();
        let guard = resolvers.register(vec![dir.path().into()]);
        assert!(resolvers.resolve("widgets").is_some());
        guard.release();
        assert!(resolvers.resolve("widgets").is_none());
        assert!(resolvers.searched().is_empty());
    }

    #[test]
    fn test_nested_release_out_of_order() {
        let (outer_dir, inner_dir) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        module_in(&outer_dir, "shared");
        let inner_path = module_in(&inner_dir, "shared");
        module_in(&outer_dir, "outer_only");

        let resolvers = Resolvers::new();
        let outer = resolvers.register(vec![outer_dir.path().into()]);
        let inner = resolvers.register(vec![inner_dir.path().into()]);

        // Newest hook answers first
        assert_eq!(resolvers.resolve("shared"), Some(inner_path));

        // Releasing the outer hook first leaves the inner one working
        drop(outer);
        assert!(resolvers.resolve("outer_only").is_none());
        assert!(resolvers.resolve("shared").is_some());

        drop(inner);
        assert!(resolvers.resolve("shared").is_none());
    }

    #[test]
    fn test_path_like_names_are_declined() {
        let dir = TempDir::new().unwrap();
        let resolvers = Resolvers::new();
        let _guard = resolvers.register(vec![dir.path().join("sub")]);
        assert!(resolvers.resolve("../widgets").is_none());
        assert!(resolvers.resolve("").is_none());
    }

    #[test]
    fn test_guard_outliving_resolvers() {
        let resolvers = Resolvers::new();
        let guard = resolvers.register(vec![]);
        drop(resolvers);
        guard.release();
    }

    #[test]
    fn test_resolution_does_not_touch_dirs() {
        let dir = TempDir::new().unwrap();
        let resolvers = Resolvers::new();
        let _guard = resolvers.register(vec![dir.path().into()]);
        let _ = resolvers.resolve("widgets");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
