//! Preview surface contract.
//!
//! The surface is owned by the session actor and is only ever called from it.

mod terminal;

pub use terminal::TerminalSurface;

use thiserror::Error;

use crate::control::Control;

/// Opaque reference to the host window, used to parent builder dialogs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct HostWindow(pub u64);

/// The surface could not paint the content it was given.
#[derive(Debug, Clone, Error)]
#[error("paint failed: {0}")]
pub struct PaintError(pub String);

/// Visible container filled by the session controller.
pub trait PreviewSurface: Send {
    /// Replace the rendered content.
    fn set_content(&mut self, control: &Control) -> Result<(), PaintError>;

    /// Show an error banner next to (never instead of) the current content.
    fn show_error(&mut self, message: &str, detail: &str);

    fn clear_error(&mut self);

    fn host_window(&self) -> HostWindow;
}
