//! `hotview watch`: live preview in the terminal.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use crate::core::{is_shutdown, register_shutdown};
use crate::session::{self, SessionOptions};
use crate::surface::TerminalSurface;
use crate::watch::{WatchFilter, Watcher};
use crate::{debug, log};

/// Editors save in bursts (truncate, write, rename); the session debounces
/// again on top of this.
const SAVE_DEBOUNCE: Duration = Duration::from_millis(50);

/// Preview `source` until Ctrl+C, rebuilding on every save.
pub async fn watch_source(source: &Path, options: SessionOptions) -> Result<()> {
    let (source, text) = super::read_source(source)?;
    let dir = source
        .parent()
        .with_context(|| format!("`{}` has no parent directory", source.display()))?
        .to_path_buf();
    let shutdown = register_shutdown();

    let (preview, task) = session::spawn(Box::new(TerminalSurface::new()), options);
    if !preview.set_builder(&source).await {
        preview.shutdown();
        let _ = task.await;
        bail!("cannot preview `{}`", source.display());
    }
    preview.update(text);

    let editor = preview.clone();
    let path = source.clone();
    let _watcher = Watcher::spawn(&dir, WatchFilter::File(source.clone()), SAVE_DEBOUNCE, move |_| {
        if is_shutdown() {
            return false;
        }
        match fs::read_to_string(&path) {
            Ok(text) => editor.update(text),
            // Mid-save; the next event carries the new text
            Err(e) => debug!("watch"; "cannot read {}: {}", path.display(), e),
        }
        true
    })
    .with_context(|| format!("cannot watch `{}`", dir.display()))?;

    log!("session"; "previewing {} (Ctrl+C to stop)", source.display());
    let _ = tokio::task::spawn_blocking(move || shutdown.recv()).await;

    preview.shutdown();
    task.await.context("session task failed")?;
    Ok(())
}
