//! Error taxonomy for manifest generation.
//!
//! Module-local errors are joined rather than thrown: a partial module is
//! still emitted with everything that could be extracted, and the aggregate
//! travels alongside it. Only cancellation and a failure to bring up the
//! query engine abort a generation call outright.

use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Build phase a failure was observed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Preprocess,
    Process,
    Postprocess,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Preprocess => write!(f, "preprocess"),
            Self::Process => write!(f, "process"),
            Self::Postprocess => write!(f, "postprocess"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A query matched but a required capture was absent.
    #[error("no capture '{capture}' in query '{query}'")]
    NoCapture { capture: String, query: String },

    /// A filesystem operation on a source or imported file failed.
    #[error("{op} {}: {source}", .path.display())]
    FileRead {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A module could not be fully processed.
    #[error("module {path}: {source}")]
    Module {
        path: String,
        #[source]
        source: Box<Error>,
    },

    /// A named component (class, field, attribute, ...) failed to extract.
    #[error("{kind} '{name}': {source}")]
    Component {
        kind: &'static str,
        name: String,
        #[source]
        source: Box<Error>,
    },

    /// A YAML doc comment failed to decode.
    #[error("yaml: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// A query in the catalog failed to compile. Fatal: no usable engine.
    #[error("query '{name}' failed to compile: {message}")]
    QueryCompile { name: String, message: String },

    /// A build phase failed.
    #[error("{phase} phase: {source}")]
    Phase {
        phase: Phase,
        #[source]
        source: Box<Error>,
    },

    /// An incremental rebuild stage failed.
    #[error("incremental {stage}: {source}")]
    Incremental {
        stage: String,
        #[source]
        source: Box<Error>,
    },

    /// The caller's cancellation token fired.
    #[error("cancelled")]
    Cancelled,

    /// Several joined errors from one module or pass.
    #[error("{0}")]
    Many(ErrorList),

    /// Free-form error without a more specific shape.
    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn module(path: impl Into<String>, source: Error) -> Self {
        Self::Module {
            path: path.into(),
            source: Box::new(source),
        }
    }

    pub fn component(kind: &'static str, name: impl Into<String>, source: Error) -> Self {
        Self::Component {
            kind,
            name: name.into(),
            source: Box::new(source),
        }
    }

    pub fn file_read(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            op,
            path: path.into(),
            source,
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// An ordered collection of errors surfaced together.
///
/// Generation keeps going past per-component failures; everything that went
/// wrong in one module is reported as a single joined value.
#[derive(Debug, Default)]
pub struct ErrorList(pub Vec<Error>);

impl ErrorList {
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, error: Error) {
        self.0.push(error);
    }

    pub fn extend(&mut self, other: ErrorList) {
        self.0.extend(other.0);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Collapse into a single error: `None` when empty, the sole error when
    /// there is exactly one, `Error::Many` otherwise.
    #[must_use]
    pub fn into_error(mut self) -> Option<Error> {
        match self.0.len() {
            0 => None,
            1 => Some(self.0.remove(0)),
            _ => Some(Error::Many(self)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Error> {
        self.0.iter()
    }
}

impl std::fmt::Display for ErrorList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}
