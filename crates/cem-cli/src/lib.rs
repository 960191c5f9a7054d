//! CLI support for the cem manifest generator.
//!
//! The `cem` binary loads configuration, runs a full build, writes the
//! manifest, and optionally stays resident in watch mode regenerating on
//! file changes.

pub mod args;
pub mod driver;
pub mod tracing_config;
pub mod watch;
