//! Error taxonomy of the isolation boundary.

use std::path::PathBuf;

use thiserror::Error;

use super::ContextId;

/// A referenced module could not be located or loaded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("module `{name}` not found in {} search directories", searched.len())]
    NotFound { name: String, searched: Vec<PathBuf> },

    #[error("failed to load `{}`: {reason}", path.display())]
    Load { path: PathBuf, reason: String },

    #[error("module `{0}` references itself")]
    Cycle(String),
}

impl ResolveError {
    /// Multi-line detail listing every searched directory.
    pub fn detail(&self) -> String {
        match self {
            Self::NotFound { searched, .. } => searched
                .iter()
                .map(|dir| format!("searched: {}", dir.display()))
                .collect::<Vec<_>>()
                .join("\n"),
            Self::Load { path, .. } => format!("file: {}", path.display()),
            Self::Cycle(_) => String::new(),
        }
    }
}

/// Context construction failed; the context has already been torn down.
#[derive(Debug, Clone, Error)]
pub enum IsolationError {
    #[error(transparent)]
    Resolution(#[from] ResolveError),

    #[error("initialization failed: {0}")]
    Initialization(String),

    #[error(transparent)]
    Handle(#[from] HandleError),
}

impl IsolationError {
    pub fn detail(&self) -> String {
        match self {
            Self::Resolution(e) => e.detail(),
            _ => String::new(),
        }
    }
}

/// A call through a `RemoteHandle` did not produce a result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandleError {
    #[error("context #{0} has been unloaded")]
    InvalidAfterUnload(ContextId),

    #[error("call into context #{0} timed out")]
    Timeout(ContextId),

    #[error("context raised: {0}")]
    Remote(String),

    #[error("callbacks are already registered on this context")]
    AlreadySubscribed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detail_lists_dirs() {
        let err = ResolveError::NotFound {
            name: "widgets".into(),
            searched: vec![PathBuf::from("/a"), PathBuf::from("/b")],
        };
        assert_eq!(err.to_string(), "module `widgets` not found in 2 search directories");
        assert_eq!(err.detail(), "searched: /a\nsearched: /b");
    }

    #[test]
    fn test_resolution_is_transparent() {
        let err = IsolationError::from(ResolveError::Cycle("a".into()));
        assert_eq!(err.to_string(), "module `a` references itself");
    }
}
