//! External command execution utilities.
//!
//! Provides a Builder-based API for running commands with stdin piping.
//!
//! # Examples
//!
//! ```ignore
//! use crate::utils::exec::Cmd;
//!
//! // Pipe source text through an external compiler
//! let output = Cmd::from_slice(&["uic", "--emit", "program"])
//!     .cwd(root)
//!     .stdin(source)
//!     .output()?;
//! ```

use anyhow::{Context, Result};
use std::{
    ffi::{OsStr, OsString},
    io::{self, Write},
    path::{Path, PathBuf},
    process::{Command, Output, Stdio},
    thread,
};

/// Command builder for external process execution.
#[derive(Default)]
pub struct Cmd {
    program: OsString,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    stdin_data: Option<Vec<u8>>,
}

impl Cmd {
    /// Create a new command builder.
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            ..Default::default()
        }
    }

    /// Create from a command array (e.g., `["uic"]` or `["npx", "uic"]`).
    pub fn from_slice<S: AsRef<OsStr>>(cmd: &[S]) -> Self {
        let mut iter = cmd.iter();
        let program = iter
            .next()
            .map(|s| s.as_ref().to_owned())
            .unwrap_or_default();
        let args: Vec<_> = iter.map(|s| s.as_ref().to_owned()).collect();
        Self {
            program,
            args,
            ..Default::default()
        }
    }

    /// Set working directory.
    pub fn cwd<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.cwd = Some(dir.as_ref().to_owned());
        self
    }

    /// Set stdin data to pipe to the process.
    pub fn stdin<D: AsRef<[u8]>>(mut self, data: D) -> Self {
        self.stdin_data = Some(data.as_ref().to_vec());
        self
    }

    /// Get the program name for error messages.
    pub fn program_name(&self) -> String {
        self.program.to_string_lossy().to_string()
    }

    /// Execute and return the output, whatever the exit status.
    pub fn output(self) -> Result<Output> {
        let name = self.program_name();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(if self.stdin_data.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn `{name}`"))?;

        // Written on its own thread so stdout and stderr keep draining
        let writer = match (child.stdin.take(), self.stdin_data) {
            (Some(mut stdin), Some(data)) => Some(thread::spawn(move || stdin.write_all(&data))),
            _ => None,
        };

        let output = child
            .wait_with_output()
            .with_context(|| format!("Failed to wait for `{name}`"))?;

        if let Some(writer) = writer {
            match writer.join() {
                // The child may exit without reading everything
                Ok(Err(e)) if e.kind() != io::ErrorKind::BrokenPipe => {
                    return Err(e).with_context(|| format!("Failed to write stdin to `{name}`"));
                }
                Ok(_) => {}
                Err(_) => anyhow::bail!("stdin writer for `{name}` panicked"),
            }
        }
        Ok(output)
    }

    /// Execute and fail on non-zero exit status.
    pub fn run(self) -> Result<Output> {
        let name = self.program_name();
        let output = self.output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Command `{name}` failed: {}\n{}", output.status, stderr.trim());
        }
        Ok(output)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_stdin_is_piped() {
        let output = Cmd::new("cat").stdin("hello").run().unwrap();
        assert_eq!(output.stdout, b"hello");
    }

    #[test]
    fn test_large_stdin_does_not_block() {
        let data = "x".repeat(1 << 20);
        let output = Cmd::new("cat").stdin(&data).run().unwrap();
        assert_eq!(output.stdout.len(), data.len());
    }

    #[test]
    fn test_output_keeps_failure() {
        let output = Cmd::from_slice(&["sh", "-c", "echo oops >&2; exit 3"])
            .output()
            .unwrap();
        assert!(!output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stderr).trim(), "oops");
    }

    #[test]
    fn test_run_fails_on_status() {
        let err = Cmd::from_slice(&["sh", "-c", "exit 1"]).run().unwrap_err();
        assert!(err.to_string().contains("failed"));
    }

    #[test]
    fn test_missing_program() {
        assert!(Cmd::new("definitely-not-a-real-program-xyz").output().is_err());
    }
}
