//! The incremental generation engine.
//!
//! A [`session::GenerateSession`] schedules per-file module-processor jobs
//! on a bounded worker pool, merges the resulting modules into an in-memory
//! manifest through a path-keyed index, and answers incremental rebuild
//! requests by consulting the dependency tracker for affected modules.

pub mod demos;
pub mod deps;
pub mod jsdoc;
pub mod members;
pub mod processor;
pub mod session;
pub mod setup;
pub mod source_refs;
pub mod styles;
pub mod template;
pub mod tokens;
pub mod yaml_doc;

pub use deps::DependencyTracker;
pub use processor::{ModuleProcessor, ProcessOutcome};
pub use session::GenerateSession;
pub use setup::SetupContext;
pub use styles::StyleCache;
