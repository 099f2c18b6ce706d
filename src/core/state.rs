//! Process-wide shutdown state.
//!
//! Ctrl+C sets `SHUTDOWN` and, once a preview is running, signals it through
//! the registered channel so the session can unload its contexts first.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam::channel::{Receiver, Sender};

/// Shutdown has been requested (Ctrl+C received)
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Shutdown signal sender for the running preview
static SHUTDOWN_TX: OnceLock<Sender<()>> = OnceLock::new();

/// Setup the global Ctrl+C handler. Call once at program start
///
/// - Before `register_shutdown()`: exit immediately, nothing to clean up
/// - After `register_shutdown()`: notify the preview and let it stop
pub fn setup_shutdown_handler() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        SHUTDOWN.store(true, Ordering::SeqCst);

        match SHUTDOWN_TX.get() {
            Some(tx) => {
                crate::log!("session"; "shutting down...");
                let _ = tx.send(());
            }
            None => std::process::exit(0),
        }
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {}", e))
}

/// Route Ctrl+C to the returned receiver instead of exiting.
///
/// Only the first registration takes effect; later calls get a receiver that
/// never fires.
pub fn register_shutdown() -> Receiver<()> {
    let (tx, rx) = crossbeam::channel::bounded(1);
    if SHUTDOWN_TX.set(tx).is_err() {
        crate::debug!("session"; "shutdown signal already registered");
    }
    rx
}

/// Check if shutdown has been requested
pub fn is_shutdown() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_signal_reaches_first_receiver() {
        let rx = register_shutdown();
        let tx = SHUTDOWN_TX.get().unwrap();
        tx.send(()).unwrap();
        assert!(rx.try_recv().is_ok());

        // A second registration never fires
        let late = register_shutdown();
        let _ = tx.try_send(());
        assert!(late.try_recv().is_err());
        assert!(!is_shutdown());
    }
}
