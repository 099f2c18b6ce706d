//! Utility modules for the preview host.

pub mod exec;
pub mod hash;
pub mod path;
