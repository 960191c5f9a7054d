//! Prepared parsing state shared by every worker.

use cem_common::Result;
use cem_query::{ParserPools, QueryManager};

/// Compiled queries and parser pools, built once per session.
///
/// Construction is the only fatal initialization step: without a compiled
/// catalog there is no usable query engine.
pub struct SetupContext {
    pub queries: QueryManager,
    pub pools: ParserPools,
}

impl SetupContext {
    /// `parser_capacity` bounds pooled parsers per grammar; it is derived
    /// from the worker count with a little headroom for enrichment passes.
    pub fn new(parser_capacity: usize) -> Result<Self> {
        Ok(Self {
            queries: QueryManager::new()?,
            pools: ParserPools::new(parser_capacity.max(1) + 2),
        })
    }
}
