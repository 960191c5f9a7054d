//! Bounded parser pools, one per grammar.
//!
//! Total parser objects per grammar are capped; `acquire` blocks when the
//! pool is exhausted. Release is RAII via [`PooledParser`]'s `Drop`, so a
//! parser returns to its pool on every exit path, panics included.

use std::sync::{Condvar, Mutex};

use cem_common::{Error, Result};
use tree_sitter::{Language, Parser, Tree};

/// Grammar a parser or query is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Grammar {
    TypeScript,
    Css,
    Html,
    Jsdoc,
}

impl Grammar {
    #[must_use]
    pub fn language(self) -> Language {
        match self {
            Self::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Self::Css => tree_sitter_css::LANGUAGE.into(),
            Self::Html => tree_sitter_html::LANGUAGE.into(),
            Self::Jsdoc => tree_sitter_jsdoc::LANGUAGE.into(),
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::TypeScript => "typescript",
            Self::Css => "css",
            Self::Html => "html",
            Self::Jsdoc => "jsdoc",
        }
    }
}

struct PoolState {
    idle: Vec<Parser>,
    created: usize,
}

/// A bounded pool of parsers for one grammar.
pub struct ParserPool {
    grammar: Grammar,
    capacity: usize,
    state: Mutex<PoolState>,
    available: Condvar,
}

impl ParserPool {
    #[must_use]
    pub fn new(grammar: Grammar, capacity: usize) -> Self {
        Self {
            grammar,
            capacity: capacity.max(1),
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                created: 0,
            }),
            available: Condvar::new(),
        }
    }

    /// Take a parser out of the pool, creating one lazily while under
    /// capacity and blocking while every parser is checked out.
    pub fn acquire(&self) -> Result<PooledParser<'_>> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| Error::other("parser pool lock poisoned"))?;
        loop {
            if let Some(parser) = state.idle.pop() {
                return Ok(PooledParser {
                    pool: self,
                    parser: Some(parser),
                });
            }
            if state.created < self.capacity {
                state.created += 1;
                drop(state);
                match self.new_parser() {
                    Ok(parser) => {
                        return Ok(PooledParser {
                            pool: self,
                            parser: Some(parser),
                        });
                    }
                    Err(error) => {
                        // Give the slot back before surfacing the failure.
                        if let Ok(mut state) = self.state.lock() {
                            state.created -= 1;
                        }
                        self.available.notify_one();
                        return Err(error);
                    }
                }
            }
            state = self
                .available
                .wait(state)
                .map_err(|_| Error::other("parser pool lock poisoned"))?;
        }
    }

    fn new_parser(&self) -> Result<Parser> {
        let mut parser = Parser::new();
        parser.set_language(&self.grammar.language()).map_err(|e| {
            Error::other(format!(
                "failed to load {} grammar: {e}",
                self.grammar.name()
            ))
        })?;
        Ok(parser)
    }

    fn release(&self, parser: Parser) {
        if let Ok(mut state) = self.state.lock() {
            state.idle.push(parser);
            self.available.notify_one();
        }
    }
}

/// RAII guard around a checked-out parser.
pub struct PooledParser<'a> {
    pool: &'a ParserPool,
    parser: Option<Parser>,
}

impl PooledParser<'_> {
    /// Parse a complete source text into a fresh tree.
    pub fn parse(&mut self, source: &[u8]) -> Result<Tree> {
        let grammar = self.pool.grammar;
        self.parser
            .as_mut()
            .expect("parser present until drop")
            .parse(source, None)
            .ok_or_else(|| Error::other(format!("{} parse returned no tree", grammar.name())))
    }
}

impl Drop for PooledParser<'_> {
    fn drop(&mut self) {
        if let Some(parser) = self.parser.take() {
            self.pool.release(parser);
        }
    }
}

/// The full pool set, one pool per grammar.
pub struct ParserPools {
    typescript: ParserPool,
    css: ParserPool,
    html: ParserPool,
    jsdoc: ParserPool,
}

impl ParserPools {
    /// `capacity` bounds parser objects per grammar; sized from the worker
    /// count so bursty loads cannot grow memory without bound.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            typescript: ParserPool::new(Grammar::TypeScript, capacity),
            css: ParserPool::new(Grammar::Css, capacity),
            html: ParserPool::new(Grammar::Html, capacity),
            jsdoc: ParserPool::new(Grammar::Jsdoc, capacity),
        }
    }

    #[must_use]
    pub fn pool(&self, grammar: Grammar) -> &ParserPool {
        match grammar {
            Grammar::TypeScript => &self.typescript,
            Grammar::Css => &self.css,
            Grammar::Html => &self.html,
            Grammar::Jsdoc => &self.jsdoc,
        }
    }

    /// Acquire, parse, release.
    pub fn parse(&self, grammar: Grammar, source: &[u8]) -> Result<Tree> {
        let mut parser = self.pool(grammar).acquire()?;
        parser.parse(source)
    }
}
