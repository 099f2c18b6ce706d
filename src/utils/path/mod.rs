//! Path utilities.
//!
//! Pure functions for path manipulation. No side effects.
//!
//! - [`fs`]: Filesystem path normalization and search-path assembly

pub mod fs;

pub use fs::{dedup_dirs, host_dir, normalize_path, resolve_path};
