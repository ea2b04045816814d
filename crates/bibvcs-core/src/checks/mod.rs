//! Consistency check engine
//!
//! A check is a named, read-only function over a [`DatabaseSnapshot`]. The
//! engine keeps checks in a deterministic order (priority, then registration
//! order), runs them in parallel, and assembles the results in that order.
//! A panicking check becomes an error result naming the check.

pub mod entries;
pub mod standard;

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ChecksConfig;
use crate::database::DatabaseSnapshot;

/// Severity of a check result
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Ok,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ok => "ok",
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

/// One finding of a check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Name of the check; filled in by the engine
    pub check: String,
    pub severity: Severity,
    pub message: String,
    /// Implicated citation keys
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<String>,
    /// Implicated files, relative to the document directory
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

impl CheckResult {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            check: String::new(),
            severity,
            message: message.into(),
            entries: Vec::new(),
            files: Vec::new(),
        }
    }

    pub fn ok(message: impl Into<String>) -> Self {
        Self::new(Severity::Ok, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn with_entry(mut self, key: impl Into<String>) -> Self {
        self.entries.push(key.into());
        self
    }

    pub fn with_file(mut self, path: impl Into<String>) -> Self {
        self.files.push(path.into());
        self
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.check, self.message)
    }
}

/// Ordered results of one engine run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    results: Vec<CheckResult>,
}

impl Report {
    pub fn new(results: Vec<CheckResult>) -> Self {
        Self { results }
    }

    /// No result has error severity; warnings never block
    pub fn is_clean(&self) -> bool {
        self.results.iter().all(|r| r.severity != Severity::Error)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CheckResult> {
        self.results.iter()
    }

    pub fn results(&self) -> &[CheckResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn errors(&self) -> impl Iterator<Item = &CheckResult> {
        self.results.iter().filter(|r| r.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &CheckResult> {
        self.results.iter().filter(|r| r.severity == Severity::Warning)
    }

    /// Results of one check
    pub fn by_check<'a>(&'a self, check: &'a str) -> impl Iterator<Item = &'a CheckResult> + 'a {
        self.results.iter().filter(move |r| r.check == check)
    }
}

impl<'a> IntoIterator for &'a Report {
    type Item = &'a CheckResult;
    type IntoIter = std::slice::Iter<'a, CheckResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for result in self.results.iter().filter(|r| r.severity != Severity::Ok) {
            writeln!(f, "{result}")?;
        }
        write!(
            f,
            "{} error(s), {} warning(s)",
            self.errors().count(),
            self.warnings().count()
        )
    }
}

/// Signature every check conforms to
pub type CheckFn = dyn Fn(&DatabaseSnapshot<'_>) -> Vec<CheckResult> + Send + Sync;

/// A registered check
#[derive(Clone)]
pub struct Check {
    name: String,
    priority: i32,
    run: Arc<CheckFn>,
}

impl Check {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Check")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Error from check registration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("Check already registered: {0}")]
    DuplicateCheck(String),
}

/// The run was cancelled before all checks completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("check run cancelled")]
pub struct Cancelled;

/// Cooperative cancellation flag shared between a caller and a run
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Registry and runner of checks
#[derive(Debug, Clone, Default)]
pub struct CheckEngine {
    checks: Vec<Check>,
}

impl CheckEngine {
    /// An engine without any checks
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine with all built-in checks not disabled in `config`
    pub fn with_standard_checks(config: &ChecksConfig) -> Self {
        let mut engine = Self::new();
        let builtins = standard::checks().into_iter().chain(entries::checks());
        for (name, run) in builtins {
            if config.is_disabled(name) {
                debug!("check '{}' disabled by configuration", name);
                continue;
            }
            // Built-in names are distinct, so registration cannot fail
            engine.checks.push(Check {
                name: name.to_string(),
                priority: 0,
                run,
            });
        }
        engine
    }

    /// Register a check that runs after all checks of lower or equal priority
    pub fn register<F>(&mut self, name: impl Into<String>, check: F) -> Result<(), RegistrationError>
    where
        F: Fn(&DatabaseSnapshot<'_>) -> Vec<CheckResult> + Send + Sync + 'static,
    {
        self.register_with_priority(name, 0, check)
    }

    /// Register a check with an explicit priority; lower priorities run first
    pub fn register_with_priority<F>(
        &mut self,
        name: impl Into<String>,
        priority: i32,
        check: F,
    ) -> Result<(), RegistrationError>
    where
        F: Fn(&DatabaseSnapshot<'_>) -> Vec<CheckResult> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.contains(&name) {
            return Err(RegistrationError::DuplicateCheck(name));
        }
        self.checks.push(Check {
            name,
            priority,
            run: Arc::new(check),
        });
        Ok(())
    }

    /// Remove a check; returns whether it was registered
    pub fn unregister(&mut self, name: &str) -> bool {
        let before = self.checks.len();
        self.checks.retain(|c| c.name != name);
        self.checks.len() != before
    }

    pub fn contains(&self, name: &str) -> bool {
        self.checks.iter().any(|c| c.name == name)
    }

    /// Checks in execution order
    pub fn checks(&self) -> Vec<&Check> {
        let mut ordered: Vec<&Check> = self.checks.iter().collect();
        // Stable sort keeps registration order within a priority
        ordered.sort_by_key(|c| c.priority);
        ordered
    }

    pub fn names(&self) -> Vec<&str> {
        self.checks().into_iter().map(Check::name).collect()
    }

    /// Run every check and collect the results
    pub fn run_all(&self, snapshot: &DatabaseSnapshot<'_>) -> Report {
        match self.run_cancellable(snapshot, &CancellationToken::new()) {
            Ok(report) => report,
            Err(Cancelled) => Report::default(),
        }
    }

    /// Run every check unless `token` is cancelled first
    ///
    /// The token is consulted before each check starts. A cancelled run
    /// returns [`Cancelled`] and no partial report.
    pub fn run_cancellable(
        &self,
        snapshot: &DatabaseSnapshot<'_>,
        token: &CancellationToken,
    ) -> Result<Report, Cancelled> {
        let ordered = self.checks();
        info!("running {} checks", ordered.len());

        let outcomes: Vec<Option<Vec<CheckResult>>> = ordered
            .par_iter()
            .map(|check| {
                if token.is_cancelled() {
                    return None;
                }
                Some(run_check(check, snapshot))
            })
            .collect();

        if token.is_cancelled() || outcomes.iter().any(Option::is_none) {
            info!("check run cancelled");
            return Err(Cancelled);
        }

        let results: Vec<CheckResult> = outcomes.into_iter().flatten().flatten().collect();
        let report = Report::new(results);
        info!(
            "checks finished: {} error(s), {} warning(s)",
            report.errors().count(),
            report.warnings().count()
        );
        Ok(report)
    }
}

fn run_check(check: &Check, snapshot: &DatabaseSnapshot<'_>) -> Vec<CheckResult> {
    debug!("running check '{}'", check.name);
    let outcome = catch_unwind(AssertUnwindSafe(|| (check.run)(snapshot)));
    let mut results = match outcome {
        Ok(results) => results,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown cause".to_string());
            warn!("check '{}' panicked: {}", check.name, reason);
            vec![CheckResult::error(format!(
                "check '{}' failed internally: {}",
                check.name, reason
            ))]
        }
    };
    if results.is_empty() {
        results.push(CheckResult::ok("no problems found"));
    }
    for result in &mut results {
        result.check = check.name.clone();
    }
    debug!("check '{}' produced {} result(s)", check.name, results.len());
    results
}

/// Names of all built-in checks, in execution order
pub fn builtin_check_names() -> Vec<&'static str> {
    standard::checks()
        .into_iter()
        .chain(entries::checks())
        .map(|(name, _)| name)
        .collect()
}
