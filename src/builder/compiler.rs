//! Compilers for the code dialect.
//!
//! A compiler turns source text into program bytes (the serialized
//! `script::Program`). The in-process `ScriptCompiler` is the default; a
//! project may point `[builder].compiler` at an external command that reads
//! source on stdin and writes the program to stdout.

use std::fmt;
use std::path::PathBuf;

use super::script::{self, Pos};
use crate::utils::exec::Cmd;

/// A located compiler message, displayed as `line:column: message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub pos: Pos,
    pub message: String,
}

impl Diagnostic {
    pub fn new(pos: Pos, message: impl Into<String>) -> Self {
        Self {
            pos,
            message: message.into(),
        }
    }

    /// Diagnostic without a known location.
    pub fn unlocated(message: impl Into<String>) -> Self {
        Self::new(Pos { line: 0, column: 0 }, message)
    }

    /// Parse `L:C: message`; anything else becomes an unlocated diagnostic.
    pub fn parse_line(line: &str) -> Self {
        let mut parts = line.splitn(3, ':');
        if let (Some(l), Some(c), Some(message)) = (parts.next(), parts.next(), parts.next())
            && let (Ok(line), Ok(column)) = (l.trim().parse(), c.trim().parse())
        {
            return Self::new(Pos { line, column }, message.trim());
        }
        Self::unlocated(line.trim())
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.pos.line, self.pos.column, self.message)
    }
}

pub trait Compiler: Send + Sync {
    fn compile(&self, source: &str) -> Result<Vec<u8>, Vec<Diagnostic>>;
}

/// In-process compiler.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptCompiler;

impl Compiler for ScriptCompiler {
    fn compile(&self, source: &str) -> Result<Vec<u8>, Vec<Diagnostic>> {
        let program = script::parse(source).map_err(|diagnostic| vec![diagnostic])?;
        program
            .to_bytes()
            .map_err(|e| vec![Diagnostic::unlocated(format!("cannot encode program: {e}"))])
    }
}

/// External compiler command run once per build.
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    command: Vec<String>,
    cwd: PathBuf,
}

impl CommandCompiler {
    pub fn new(command: Vec<String>, cwd: PathBuf) -> Self {
        Self { command, cwd }
    }
}

impl Compiler for CommandCompiler {
    fn compile(&self, source: &str) -> Result<Vec<u8>, Vec<Diagnostic>> {
        let Some(program) = self.command.first() else {
            return Err(vec![Diagnostic::unlocated("no compiler command configured")]);
        };
        if which::which(program).is_err() {
            return Err(vec![Diagnostic::unlocated(format!(
                "compiler `{program}` not found in PATH"
            ))]);
        }

        let output = Cmd::from_slice(&self.command)
            .cwd(&self.cwd)
            .stdin(source)
            .output()
            .map_err(|e| vec![Diagnostic::unlocated(format!("{e:#}"))])?;

        if output.status.success() && !output.stdout.is_empty() {
            return Ok(output.stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut diagnostics: Vec<_> = stderr
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(Diagnostic::parse_line)
            .collect();
        if diagnostics.is_empty() {
            diagnostics.push(Diagnostic::unlocated(format!(
                "`{program}` exited with {} and no output",
                output.status
            )));
        }
        Err(diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_display() {
        let d = Diagnostic::new(Pos { line: 3, column: 7 }, "expected `;`");
        assert_eq!(d.to_string(), "3:7: expected `;`");
    }

    #[test]
    fn test_parse_line() {
        let d = Diagnostic::parse_line("12:4: unknown name");
        assert_eq!(d.pos, Pos { line: 12, column: 4 });
        assert_eq!(d.message, "unknown name");

        let d = Diagnostic::parse_line("error: boom");
        assert_eq!(d.pos, Pos { line: 0, column: 0 });
        assert_eq!(d.message, "error: boom");
    }

    #[test]
    fn test_script_compiler() {
        assert!(ScriptCompiler.compile("Content = new Label();").is_ok());
        let errors = ScriptCompiler.compile("Content = ;").unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].pos.column, 11);
    }

    #[test]
    fn test_missing_command() {
        let compiler = CommandCompiler::new(
            vec!["definitely-not-a-real-compiler-xyz".into()],
            std::env::temp_dir(),
        );
        let errors = compiler.compile("").unwrap_err();
        assert!(errors[0].message.contains("not found"));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_diagnostics_from_stderr() {
        let compiler = CommandCompiler::new(
            vec![
                "sh".into(),
                "-c".into(),
                "echo '2:5: Labl is undefined' >&2; exit 1".into(),
            ],
            std::env::temp_dir(),
        );
        let errors = compiler.compile("Content = new Labl();").unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "2:5: Labl is undefined");
    }

    #[cfg(unix)]
    #[test]
    fn test_command_stdout_is_program() {
        let compiler = CommandCompiler::new(vec!["cat".into()], std::env::temp_dir());
        assert_eq!(compiler.compile("bytes").unwrap(), b"bytes");
    }

    #[cfg(unix)]
    #[test]
    fn test_command_larger_than_pipe_buffer() {
        let compiler = CommandCompiler::new(vec!["cat".into()], std::env::temp_dir());
        let source = "x".repeat(1 << 20);
        assert_eq!(compiler.compile(&source).unwrap().len(), source.len());
    }
}
