//! Builder strategies: user source text -> live control.
//!
//! ```text
//! BuilderRegistry::find(path) -> BuilderInfo -> (factory) -> Box<dyn Builder>
//!                                                              |
//!                           source text + ControlTypes ------> create()
//!                                                              |
//!                                              Result<Control, BuildError>
//! ```
//!
//! Builders run inside an isolation context. The isolate turns the returned
//! `Result` into exactly one callback to the host.

mod code;
mod compiler;
mod markup;
mod script;


pub use code::CodeBuilder;
pub use compiler::{CommandCompiler, Compiler, Diagnostic, ScriptCompiler};
pub use markup::MarkupBuilder;

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::config::BuilderConfig;
use crate::control::{Control, ControlTypes};
use crate::surface::HostWindow;

/// Deepest control nesting either dialect accepts.
///
/// Program bytes spend up to four levels of JSON nesting per control, which
/// keeps a program at this depth inside `serde_json`'s recursion limit.
pub const MAX_DEPTH: usize = 24;

fn nesting_too_deep() -> String {
    format!("nesting too deep (more than {MAX_DEPTH} levels)")
}

/// A failed build: short message for the banner, full detail on demand.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BuildError {
    pub message: String,
    pub detail: String,
}

impl BuildError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: String::new(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    /// `message`, with its `line:column` in the detail.
    pub fn located(message: impl Into<String>, line: u32, column: u32) -> Self {
        let message = message.into();
        let detail = format!("line {line}, column {column}: {message}");
        Self::new(message).with_detail(detail)
    }

    /// `name is undefined`, located at `line:column`.
    pub fn undefined(name: &str, line: u32, column: u32) -> Self {
        Self::new(format!("{name} is undefined"))
            .with_detail(format!("line {line}, column {column}: no control type named `{name}`"))
    }

    /// First diagnostic becomes the message, all of them the detail.
    pub fn from_diagnostics(diagnostics: &[Diagnostic]) -> Self {
        let Some(first) = diagnostics.first() else {
            return Self::new("compilation failed without diagnostics");
        };
        let mut detail = String::new();
        for diagnostic in diagnostics {
            let _ = writeln!(detail, "{diagnostic}");
        }
        detail.truncate(detail.trim_end().len());
        Self::new(first.message.clone()).with_detail(detail)
    }
}

/// Everything a builder may consult while creating a control.
pub struct BuildCx<'a> {
    pub types: &'a ControlTypes,
    /// File the source text belongs to
    pub source_path: &'a Path,
    /// Parent for any modal dialog the builder needs
    pub host_window: HostWindow,
}

/// Per-source-kind conversion from text to a control.
pub trait Builder: Send {
    fn kind(&self) -> &'static str;

    fn create(&mut self, source: &str, cx: &BuildCx<'_>) -> Result<Control, BuildError>;
}

type Factory = Arc<dyn Fn() -> Box<dyn Builder> + Send + Sync>;

/// Maps a file-name suffix to a builder factory.
#[derive(Clone)]
pub struct BuilderInfo {
    pub kind: &'static str,
    /// Lowercase suffix including the leading dot (`.ui.xml`)
    pub suffix: String,
    factory: Factory,
}

impl BuilderInfo {
    pub fn new<F>(kind: &'static str, suffix: &str, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Builder> + Send + Sync + 'static,
    {
        Self {
            kind,
            suffix: suffix.to_ascii_lowercase(),
            factory: Arc::new(factory),
        }
    }

    pub fn create(&self) -> Box<dyn Builder> {
        (self.factory)()
    }
}

impl std::fmt::Debug for BuilderInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuilderInfo")
            .field("kind", &self.kind)
            .field("suffix", &self.suffix)
            .finish_non_exhaustive()
    }
}

/// Immutable builder lookup table.
#[derive(Debug, Clone, Default)]
pub struct BuilderRegistry {
    infos: Vec<BuilderInfo>,
}

impl BuilderRegistry {
    pub fn new(infos: Vec<BuilderInfo>) -> Self {
        Self { infos }
    }

    /// Registry with the code and markup builders.
    ///
    /// The code builder compiles through `config.compiler` when set, in-process
    /// otherwise.
    pub fn with_defaults(config: &BuilderConfig, root: &Path) -> Self {
        let compiler: Arc<dyn Compiler> = match config.compiler.as_deref() {
            Some(command) if !command.is_empty() => {
                Arc::new(CommandCompiler::new(command.to_vec(), root.to_path_buf()))
            }
            _ => Arc::new(ScriptCompiler),
        };

        let mut infos = Vec::new();
        for suffix in &config.code_suffixes {
            let compiler = Arc::clone(&compiler);
            infos.push(BuilderInfo::new("code", suffix, move || {
                Box::new(CodeBuilder::new(Arc::clone(&compiler)))
            }));
        }
        for suffix in &config.markup_suffixes {
            infos.push(BuilderInfo::new("markup", suffix, || {
                Box::new(MarkupBuilder::new())
            }));
        }
        Self::new(infos)
    }

    /// Longest (most specific) suffix matching the file name.
    pub fn find(&self, path: &Path) -> Option<&BuilderInfo> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        self.infos
            .iter()
            .filter(|info| name.ends_with(&info.suffix) && name.len() > info.suffix.len())
            .max_by_key(|info| info.suffix.len())
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }
}
