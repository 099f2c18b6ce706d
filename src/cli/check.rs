//! `hotview check`: build a source file once.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::log;
use crate::session::{self, SessionOptions, SessionSnapshot};
use crate::surface::TerminalSurface;

/// Build `source` once and print the preview. `Ok(false)` if it did not
/// render.
pub async fn check_source(
    source: &Path,
    options: SessionOptions,
    timeout: Duration,
) -> Result<bool> {
    let (source, text) = super::read_source(source)?;
    let (preview, task) = session::spawn(Box::new(TerminalSurface::new().appending()), options);

    let rendered = if preview.set_builder(&source).await {
        preview.update(text);
        match preview.settled(timeout).await {
            Some(snapshot) => succeeded(&snapshot),
            None => {
                log!("error"; "no result after {}s", timeout.as_secs());
                false
            }
        }
    } else {
        false
    };

    preview.shutdown();
    task.await.context("session task failed")?;
    Ok(rendered)
}

fn succeeded(snapshot: &SessionSnapshot) -> bool {
    snapshot.rendered.is_some() && snapshot.error.is_none()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn test_check_renders_valid_source() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("main.ui");
        fs::write(&source, "Content = new Label { Text = \"ok\" };").unwrap();

        let ok = check_source(&source, SessionOptions::default(), TIMEOUT)
            .await
            .unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn test_check_fails_on_build_error() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("main.ui.xml");
        fs::write(&source, "<Panel><Labl /></Panel>").unwrap();

        let ok = check_source(&source, SessionOptions::default(), TIMEOUT)
            .await
            .unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn test_check_rejects_unknown_suffix() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("main.rs");
        fs::write(&source, "fn main() {}").unwrap();

        let ok = check_source(&source, SessionOptions::default(), TIMEOUT)
            .await
            .unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn test_check_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result =
            check_source(&dir.path().join("gone.ui"), SessionOptions::default(), TIMEOUT).await;
        assert!(result.is_err());
    }
}
