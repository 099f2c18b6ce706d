//! File-change watcher with debounce.
//!
//! Watches one directory (non-recursively) and reports each burst of matching
//! writes once, after the burst has been quiet for the debounce interval.
//!
//! Architecture:
//! ```text
//! notify (std thread) → bridge thread → FsActor (tokio task) → Debouncer → on_change
//! ```
//!
//! Dropping the `Watcher` stops the task, which drops the notify watcher and
//! lets the bridge thread exit.

mod debouncer;


use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher as _};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use debouncer::Debouncer;

/// Which paths in the watched directory count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchFilter {
    /// Files with one of these extensions (no leading dot)
    Extensions(Vec<String>),
    /// Exactly this file
    File(PathBuf),
}

impl WatchFilter {
    pub fn matches(&self, path: &Path) -> bool {
        match self {
            Self::Extensions(extensions) => path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| extensions.iter().any(|x| x.eq_ignore_ascii_case(ext))),
            Self::File(file) => path.file_name() == file.file_name(),
        }
    }
}

/// Running watcher. Stops when dropped.
pub struct Watcher {
    dir: PathBuf,
    task: JoinHandle<()>,
}

impl Watcher {
    /// Watch `dir` and call `on_change` with each debounced batch of paths.
    ///
    /// `on_change` returning `false` stops the watcher. Must be called from
    /// within a tokio runtime.
    pub fn spawn<F>(
        dir: &Path,
        filter: WatchFilter,
        debounce: Duration,
        on_change: F,
    ) -> notify::Result<Self>
    where
        F: FnMut(Vec<PathBuf>) -> bool + Send + 'static,
    {
        let actor = FsActor::new(dir, filter, debounce, on_change)?;
        crate::debug!("watch"; "watching {}", dir.display());
        Ok(Self {
            dir: dir.to_path_buf(),
            task: tokio::spawn(actor.run()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// FileSystem Actor - watches for file changes
struct FsActor<F> {
    /// Channel to receive notify events (sync -> async bridge)
    notify_rx: std::sync::mpsc::Receiver<notify::Result<notify::Event>>,
    /// Watcher handle (must be kept alive)
    watcher: RecommendedWatcher,
    filter: WatchFilter,
    debouncer: Debouncer,
    on_change: F,
}

impl<F> FsActor<F>
where
    F: FnMut(Vec<PathBuf>) -> bool + Send + 'static,
{
    /// The watcher starts immediately, buffering events until `run`.
    fn new(
        dir: &Path,
        filter: WatchFilter,
        debounce: Duration,
        on_change: F,
    ) -> notify::Result<Self> {
        let (notify_tx, notify_rx) = std::sync::mpsc::channel();

        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = notify_tx.send(res);
        })?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        Ok(Self {
            notify_rx,
            watcher,
            filter,
            debouncer: Debouncer::new(debounce),
            on_change,
        })
    }

    async fn run(self) {
        let Self {
            notify_rx,
            watcher,
            filter,
            mut debouncer,
            mut on_change,
        } = self;
        // Keep the watcher alive for the lifetime of the task
        let _watcher = watcher;

        let (async_tx, mut async_rx) = mpsc::channel::<notify::Event>(64);

        // Spawn a thread to poll notify events and send to async channel
        std::thread::spawn(move || {
            while let Ok(result) = notify_rx.recv() {
                match result {
                    Ok(event) => {
                        if async_tx.blocking_send(event).is_err() {
                            break; // Receiver dropped
                        }
                    }
                    Err(e) => crate::log!("watch"; "notify error: {}", e),
                }
            }
        });

        loop {
            tokio::select! {
                biased;
                event = async_rx.recv() => match event {
                    Some(event) => debouncer.add_event(&event, &filter),
                    None => break,
                },
                _ = tokio::time::sleep(debouncer.sleep_duration()) => {
                    if let Some(paths) = debouncer.take_if_ready() {
                        crate::debug!("watch"; "{} file(s) changed", paths.len());
                        if !on_change(paths) {
                            break;
                        }
                    }
                }
            }
        }
    }
}
