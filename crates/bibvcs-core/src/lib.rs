//! bibvcs Core - BibTeX databases under version control
//!
//! This crate binds a parsed bibliography to the files around it:
//!
//! - **Database**: bib file, journal registry and document directory in one root
//! - **Config**: per-database `bibvcs.toml` and the user-level default database
//! - **Documents**: directory listing and entry-to-document matching strategies
//! - **Checks**: a registry of consistency checks run in parallel over a snapshot
//! - **Vcs**: the commit gate that refuses databases with check errors
//!
//! Parsing and serialization live in `bibvcs-bibtex`.

pub mod checks;
pub mod config;
pub mod database;
pub mod documents;
pub mod error;
pub mod vcs;

pub use checks::{
    builtin_check_names, CancellationToken, Cancelled, Check, CheckEngine, CheckFn, CheckResult,
    RegistrationError, Report, Severity,
};
pub use config::{
    ChecksConfig, ConfigError, DatabaseConfig, Expectation, Linking, LinkingConfig, UserConfig,
    CONFIG_FILE_NAME,
};
pub use database::{Database, DatabaseSnapshot};
pub use documents::{
    matcher_for, CiteKeyMatcher, DirectorySource, DocumentListing, DocumentMatcher,
    DocumentSource, EntryDocuments, FileFieldMatcher, StaticSource,
};
pub use error::{BibVcsError, Result};
pub use vcs::CommitGate;
