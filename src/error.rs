//! Errors raised while instrumenting a source tree

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort an instrumentation run
#[derive(Error, Debug)]
pub enum InstrumentError {
    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: syntax error at line {line}, column {column}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        column: usize,
    },

    #[error("Failed to back up {}: {source}", path.display())]
    Backup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Incompatible tree-sitter grammar: {0}")]
    Language(#[from] tree_sitter::LanguageError),
}

impl InstrumentError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for instrumentation operations
pub type Result<T> = std::result::Result<T, InstrumentError>;
