//! Error types for bibvcs-core

use std::path::PathBuf;

use bibvcs_bibtex::{ConfigFormatError, JournalError, ModelError, ParseError};
use thiserror::Error;

use crate::checks::{Cancelled, RegistrationError, Report};
use crate::config::ConfigError;

/// Result type alias for bibvcs operations
pub type Result<T> = std::result::Result<T, BibVcsError>;

/// Main error type for bibvcs operations
#[derive(Error, Debug)]
pub enum BibVcsError {
    /// Reading or writing a database file failed
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The bib file is malformed
    #[error("{}:{}: {}", path.display(), source.position(), source.description())]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    /// The journal registry file is malformed
    #[error("{}: {source}", path.display())]
    Journals {
        path: PathBuf,
        #[source]
        source: ConfigFormatError,
    },

    /// Database or user configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Rejected change to the bibliography
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Rejected change to the journal registry
    #[error("Journal error: {0}")]
    Journal(#[from] JournalError),

    /// Check registration errors
    #[error("Check registration error: {0}")]
    Registration(#[from] RegistrationError),

    /// A check run was cancelled before it completed
    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    /// The checks found errors, so the commit must not happen
    #[error("Commit rejected: {} error(s) found", .0.errors().count())]
    CommitRejected(Report),
}

impl BibVcsError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
