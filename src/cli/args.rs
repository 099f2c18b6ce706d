//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::session::SessionOptions;

/// hotview isolated preview CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path (default: nearest preview.toml above the source)
    #[arg(short = 'C', long, global = true, value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Toolkit platform, overriding `[project] platform`
    #[arg(short, long, global = true)]
    pub platform: Option<String>,

    /// Enable verbose output for debugging
    #[arg(short = 'V', long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Preview a source file, rebuilding on every save
    #[command(visible_alias = "w")]
    Watch {
        /// UI source file (`.ui`, `.ui.xml`, ...)
        #[arg(value_hint = clap::ValueHint::FilePath)]
        source: PathBuf,
    },

    /// Build a source file once; exit status 1 if it does not render
    #[command(visible_alias = "c")]
    Check {
        /// UI source file (`.ui`, `.ui.xml`, ...)
        #[arg(value_hint = clap::ValueHint::FilePath)]
        source: PathBuf,

        /// Seconds to wait for the build
        #[arg(short, long, default_value_t = 60)]
        timeout: u64,
    },
}

impl Cli {
    pub fn source(&self) -> &Path {
        match &self.command {
            Commands::Watch { source } | Commands::Check { source, .. } => source,
        }
    }

    /// Session settings taken from the command line.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            config: self.config.clone(),
            platform: self.platform.clone(),
            registry: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_watch() {
        let cli = Cli::try_parse_from(["hotview", "watch", "views/main.ui"]).unwrap();
        assert_eq!(cli.source(), Path::new("views/main.ui"));
        assert!(!cli.verbose);
        assert!(cli.session_options().config.is_none());
    }

    #[test]
    fn test_parse_check_with_globals() {
        let cli = Cli::try_parse_from([
            "hotview", "c", "main.ui.xml", "--timeout", "5", "-V", "-p", "gtk", "-C", "alt.toml",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Check { timeout: 5, .. }));
        assert!(cli.verbose);

        let options = cli.session_options();
        assert_eq!(options.platform.as_deref(), Some("gtk"));
        assert_eq!(options.config, Some(PathBuf::from("alt.toml")));
    }

    #[test]
    fn test_source_is_required() {
        assert!(Cli::try_parse_from(["hotview", "watch"]).is_err());
    }
}
