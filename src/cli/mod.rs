//! Command-line interface module.

mod args;
pub mod check;
pub mod watch;

pub use args::{Cli, Commands};

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::utils::path::normalize_path;

/// Absolute path and current text of a source file.
fn read_source(path: &Path) -> Result<(PathBuf, String)> {
    let path = normalize_path(path);
    let text = fs::read_to_string(&path)
        .with_context(|| format!("cannot read source file `{}`", path.display()))?;
    Ok((path, text))
}
