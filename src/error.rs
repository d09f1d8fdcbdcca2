//! Error types for distribution resolution and lifecycle orchestration.

use thiserror::Error;

use crate::lifecycle::Action;

/// Malformed os-release text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// A line that is not `KEY=VALUE`.
    #[error("Failed to parse output of FreeDesktop os-release file; Line {line}: {content:?}")]
    InvalidLine { line: usize, content: String },

    /// A quoted value that is not a valid literal.
    #[error("Failed to parse output of FreeDesktop os-release file; Line {line}: {message}")]
    InvalidQuoting { line: usize, message: String },
}

impl ParseError {
    /// 1-based line number of the offending line.
    pub fn line(&self) -> usize {
        match self {
            ParseError::InvalidLine { line, .. } | ParseError::InvalidQuoting { line, .. } => *line,
        }
    }
}

/// The os-release source could not be read.
#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error(
        "could not find Freedesktop-compliant os-release at '{path}'. \
         Is this a Freedesktop-compliant Linux distribution?"
    )]
    Host {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not read os-release inside image '{image}': {reason}")]
    Image { image: String, reason: String },

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// A lifecycle step failed; the remaining chain and batch are abandoned.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("tool verification failed before processing '{app}'")]
    Verify {
        app: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("{action} failed for '{app}'")]
    Action {
        action: Action,
        app: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("could not query lifecycle state of '{app}'")]
    State {
        app: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("app '{app}' already exists; use `update` to refresh it")]
    AlreadyCreated { app: String },

    #[error("app '{app}' has not been created; use `create` or `build` first")]
    NotCreated { app: String },
}
