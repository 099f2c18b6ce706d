//! Terminal preview surface.
//!
//! Renders the control tree as an indented block and overlays the error
//! banner underneath it, so a failed rebuild never hides the last good preview.

use owo_colors::OwoColorize;

use super::{HostWindow, PaintError, PreviewSurface};
use crate::control::Control;
use crate::logger::WatchStatus;

/// Preview surface drawing into the terminal status block.
pub struct TerminalSurface {
    status: WatchStatus,
    content: Option<String>,
    error: Option<(String, String)>,
    /// Keep each render on screen instead of overwriting it
    append: bool,
}

impl TerminalSurface {
    pub fn new() -> Self {
        Self {
            status: WatchStatus::new(),
            content: None,
            error: None,
            append: false,
        }
    }

    /// Never overwrite previous output (one-shot mode).
    pub fn appending(mut self) -> Self {
        self.append = true;
        self
    }

    fn redraw(&mut self) {
        if self.append {
            self.status.detach();
        }
        let content = self
            .content
            .clone()
            .unwrap_or_else(|| format!("{}", "(nothing rendered yet)".dimmed()));

        match &self.error {
            None => self.status.success(&content),
            Some((message, detail)) => {
                let mut banner = format!("{content}\n{}", message.red().bold());
                if !detail.is_empty() {
                    banner.push('\n');
                    banner.push_str(&format!("{}", detail.dimmed()));
                }
                self.status.warning(&banner);
            }
        }
    }
}

impl Default for TerminalSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl PreviewSurface for TerminalSurface {
    fn set_content(&mut self, control: &Control) -> Result<(), PaintError> {
        if control.count() > 10_000 {
            return Err(PaintError(format!(
                "{} controls is more than the terminal can show",
                control.count()
            )));
        }
        self.content = Some(control.render_tree());
        self.redraw();
        Ok(())
    }

    fn show_error(&mut self, message: &str, detail: &str) {
        self.error = Some((message.to_string(), detail.to_string()));
        self.redraw();
    }

    fn clear_error(&mut self) {
        if self.error.take().is_some() {
            self.redraw();
        }
    }

    fn host_window(&self) -> HostWindow {
        HostWindow::default()
    }
}
