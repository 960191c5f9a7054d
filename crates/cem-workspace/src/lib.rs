//! Workspace context for manifest generation.
//!
//! Owns the configuration record and everything path-shaped: globbing
//! configured inputs, converting between filesystem and module-relative
//! paths, resolving relative import specifiers, opening output writers,
//! and reading `package.json`.

pub mod config;
pub mod context;

pub use config::{Config, DemoDiscoveryConfig, DesignTokensConfig, GenerateConfig, load_config};
pub use context::{PackageJson, Workspace};
