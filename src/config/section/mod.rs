//! Configuration section definitions.
//!
//! Each module corresponds to a section in `preview.toml`:
//!
//! | Module    | TOML Section | Purpose                                   |
//! |-----------|--------------|-------------------------------------------|
//! | `project` | `[project]`  | Platform, compiled output, dependencies   |
//! | `session` | `[session]`  | Debounce and context timeouts             |
//! | `watch`   | `[watch]`    | Compiled-output watcher                   |
//! | `builder` | `[builder]`  | Builder suffixes and external compiler    |

mod builder;
mod project;
mod session;
mod watch;

pub use builder::BuilderConfig;
pub use project::ProjectConfig;
pub use session::SessionConfig;
pub use watch::WatchConfig;
