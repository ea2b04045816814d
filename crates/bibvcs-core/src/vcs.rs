//! Commit gate
//!
//! Version-control front ends call [`CommitGate::approve`] before committing
//! a database. The transport itself (svn, git, ...) lives outside this crate.

use tracing::{info, warn};

use crate::checks::{CancellationToken, CheckEngine, Report};
use crate::config::ChecksConfig;
use crate::database::Database;
use crate::documents::DocumentSource;
use crate::error::{BibVcsError, Result};

/// Runs a check engine over a database and refuses unclean states
#[derive(Debug, Clone, Default)]
pub struct CommitGate {
    engine: CheckEngine,
}

impl CommitGate {
    pub fn new(engine: CheckEngine) -> Self {
        Self { engine }
    }

    /// A gate running the built-in checks the database enables
    pub fn for_database(database: &Database) -> Self {
        Self::new(CheckEngine::with_standard_checks(&database.config().checks))
    }

    /// A gate running the built-in checks `config` enables
    pub fn with_config(config: &ChecksConfig) -> Self {
        Self::new(CheckEngine::with_standard_checks(config))
    }

    pub fn engine(&self) -> &CheckEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut CheckEngine {
        &mut self.engine
    }

    /// Check the database as it is on disk
    ///
    /// Returns the full report when no check reported an error; warnings
    /// do not block.
    pub fn approve(&self, database: &Database) -> Result<Report> {
        let snapshot = database.snapshot()?;
        self.decide(self.engine.run_all(&snapshot))
    }

    /// Like [`CommitGate::approve`] with a caller-supplied document listing
    pub fn approve_with(&self, database: &Database, source: &dyn DocumentSource) -> Result<Report> {
        let snapshot = database.snapshot_with(source)?;
        self.decide(self.engine.run_all(&snapshot))
    }

    /// Like [`CommitGate::approve`], abandoning the run once `token` is cancelled
    pub fn approve_cancellable(
        &self,
        database: &Database,
        token: &CancellationToken,
    ) -> Result<Report> {
        let snapshot = database.snapshot()?;
        let report = self.engine.run_cancellable(&snapshot, token)?;
        self.decide(report)
    }

    fn decide(&self, report: Report) -> Result<Report> {
        if report.is_clean() {
            info!("commit approved with {} warning(s)", report.warnings().count());
            Ok(report)
        } else {
            warn!("commit rejected: {} error(s)", report.errors().count());
            Err(BibVcsError::CommitRejected(report))
        }
    }
}
