//! Pooled CST parsers and the compiled query catalog.
//!
//! Parsers are process-wide resources with explicit acquire/release; the
//! query catalog is compiled once per session and shared read-only across
//! every module-processing job. Query predicates (`#eq?` and friends) are
//! not used; the streaming cursor does not apply them, so capture text is
//! filtered in code instead.

pub mod captures;
pub mod pool;
pub mod queries;

pub use captures::{CaptureGroup, CaptureMap, CaptureRecord, parent_captures};
pub use pool::{Grammar, ParserPool, ParserPools, PooledParser};
pub use queries::QueryManager;
