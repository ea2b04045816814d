//! Database aggregate
//!
//! A database is a directory holding `bibvcs.toml`, the bib file, the
//! journal registry and the document directory. Checks never see the
//! database directly: they run against a [`DatabaseSnapshot`] whose document
//! listing was read exactly once.

use std::path::{Path, PathBuf};

use bibvcs_bibtex::{
    Bibliography, ConfigFormatError, JournalMacros, JournalRegistry, JournalStyle,
};
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::documents::{matcher_for, DirectorySource, DocumentListing, DocumentMatcher, DocumentSource};
use crate::error::{BibVcsError, Result};

/// A bibliography bound to its journal registry and document directory
#[derive(Debug, Clone)]
pub struct Database {
    root: PathBuf,
    config: DatabaseConfig,
    bibliography: Bibliography,
    journals: JournalRegistry,
}

impl Database {
    /// Open the database in `root`
    ///
    /// A missing configuration or journal file yields defaults; a missing bib
    /// file is an error.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let config = DatabaseConfig::load(&root)?;
        info!("opening database {}", root.display());

        let bib_path = root.join(&config.bibfile);
        let text =
            std::fs::read_to_string(&bib_path).map_err(|e| BibVcsError::io(&bib_path, e))?;
        let bibliography = Bibliography::parse(&text).map_err(|source| BibVcsError::Parse {
            path: bib_path.clone(),
            source,
        })?;
        debug!("parsed {} entries from {}", bibliography.len(), bib_path.display());

        let journals_path = root.join(&config.journals);
        let journals = if journals_path.exists() {
            let text = std::fs::read_to_string(&journals_path)
                .map_err(|e| BibVcsError::io(&journals_path, e))?;
            load_journals(&text).map_err(|source| BibVcsError::Journals {
                path: journals_path.clone(),
                source,
            })?
        } else {
            debug!("no journal file at {}", journals_path.display());
            JournalRegistry::new()
        };

        Ok(Self {
            root,
            config,
            bibliography,
            journals,
        })
    }

    /// Assemble a database from parts already in memory
    pub fn new(
        root: impl Into<PathBuf>,
        config: DatabaseConfig,
        bibliography: Bibliography,
        journals: JournalRegistry,
    ) -> Self {
        Self {
            root: root.into(),
            config,
            bibliography,
            journals,
        }
    }

    /// A database with default configuration and no journals, rooted at `.`
    pub fn in_memory(bibliography: Bibliography) -> Self {
        Self::new(".", DatabaseConfig::default(), bibliography, JournalRegistry::new())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn bibliography(&self) -> &Bibliography {
        &self.bibliography
    }

    pub fn bibliography_mut(&mut self) -> &mut Bibliography {
        &mut self.bibliography
    }

    pub fn journals(&self) -> &JournalRegistry {
        &self.journals
    }

    pub fn journals_mut(&mut self) -> &mut JournalRegistry {
        &mut self.journals
    }

    pub fn bib_path(&self) -> PathBuf {
        self.root.join(&self.config.bibfile)
    }

    pub fn journals_path(&self) -> PathBuf {
        self.root.join(&self.config.journals)
    }

    pub fn documents_path(&self) -> PathBuf {
        self.root.join(&self.config.documents)
    }

    /// Path of a generated journal macro file: `<bibfile>_full.bib` or `<bibfile>_abbr.bib`
    pub fn journal_macro_path(&self, style: JournalStyle) -> PathBuf {
        let bib_path = self.bib_path();
        let stem = bib_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "references".to_string());
        bib_path.with_file_name(format!("{stem}_{}.bib", style.suffix()))
    }

    /// Journal style used for textual rendering
    pub fn journal_style(&self) -> JournalStyle {
        if self.config.abbreviate {
            JournalStyle::Abbreviated
        } else {
            JournalStyle::Full
        }
    }

    /// Write the bibliography back to its bib file
    pub fn save(&self) -> Result<()> {
        let path = self.bib_path();
        std::fs::write(&path, self.bibliography.serialize())
            .map_err(|e| BibVcsError::io(&path, e))?;
        info!("saved {}", path.display());
        Ok(())
    }

    /// Regenerate both journal macro files; returns the written paths
    pub fn write_journal_macros(&self) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for style in [JournalStyle::Full, JournalStyle::Abbreviated] {
            let path = self.journal_macro_path(style);
            std::fs::write(&path, self.journals.generate(style))
                .map_err(|e| BibVcsError::io(&path, e))?;
            info!("wrote {} journal macros to {}", self.journals.len(), path.display());
            written.push(path);
        }
        Ok(written)
    }

    /// Write the journal registry and regenerate the derived macro files
    pub fn save_journals(&self) -> Result<Vec<PathBuf>> {
        let path = self.journals_path();
        std::fs::write(&path, self.journals.to_config()).map_err(|e| BibVcsError::io(&path, e))?;
        self.write_journal_macros()
    }

    /// Read the document directory and freeze the state checks will see
    pub fn snapshot(&self) -> Result<DatabaseSnapshot<'_>> {
        self.snapshot_with(&DirectorySource::new(self.documents_path()))
    }

    /// Like [`Database::snapshot`] with a caller-supplied document listing
    pub fn snapshot_with(&self, source: &dyn DocumentSource) -> Result<DatabaseSnapshot<'_>> {
        let rules = self.config.linking.ignore_rules()?;
        let documents = source
            .list()
            .map_err(|e| BibVcsError::io(self.documents_path(), e))?
            .without_ignored(&rules);
        debug!("snapshot with {} documents", documents.len());
        Ok(DatabaseSnapshot {
            database: self,
            documents,
            matcher: matcher_for(&self.config.linking),
        })
    }
}

/// Registry files in the legacy `macro|abbr|full` format have no sections
fn load_journals(text: &str) -> std::result::Result<JournalRegistry, ConfigFormatError> {
    let legacy = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with(';'))
        .is_some_and(|line| !line.starts_with('[') && line.contains('|'));
    if legacy {
        JournalRegistry::from_legacy_text(text)
    } else {
        JournalRegistry::from_config(text)
    }
}

/// Read-only view of a database with its document listing materialized
pub struct DatabaseSnapshot<'a> {
    database: &'a Database,
    documents: DocumentListing,
    matcher: Box<dyn DocumentMatcher>,
}

impl<'a> DatabaseSnapshot<'a> {
    pub fn database(&self) -> &'a Database {
        self.database
    }

    pub fn config(&self) -> &'a DatabaseConfig {
        &self.database.config
    }

    pub fn bibliography(&self) -> &'a Bibliography {
        &self.database.bibliography
    }

    pub fn journals(&self) -> &'a JournalRegistry {
        &self.database.journals
    }

    /// Journal names as a macro source, in the configured style
    pub fn journal_macros(&self) -> JournalMacros<'a> {
        self.database.journals.macros(self.database.journal_style())
    }

    /// Files in the document directory, relative to it
    pub fn documents(&self) -> &DocumentListing {
        &self.documents
    }

    pub fn matcher(&self) -> &dyn DocumentMatcher {
        self.matcher.as_ref()
    }
}

impl std::fmt::Debug for DatabaseSnapshot<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSnapshot")
            .field("root", &self.database.root)
            .field("documents", &self.documents)
            .field("matcher", &self.matcher.strategy())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::StaticSource;

    #[test]
    fn test_journal_macro_paths() {
        let db = Database::in_memory(Bibliography::default());
        assert_eq!(
            db.journal_macro_path(JournalStyle::Full),
            Path::new(".").join("references_full.bib")
        );
        assert_eq!(
            db.journal_macro_path(JournalStyle::Abbreviated),
            Path::new(".").join("references_abbr.bib")
        );
    }

    #[test]
    fn test_snapshot_applies_ignore_rules() {
        let db = Database::in_memory(Bibliography::default());
        let source = StaticSource(DocumentListing::new([
            "a.pdf",
            ".DS_Store",
            "sub/Thumbs.db",
            "sub/desktop.ini",
        ]));
        let snapshot = db.snapshot_with(&source).unwrap();
        assert_eq!(snapshot.documents().iter().collect::<Vec<_>>(), vec!["a.pdf"]);
        assert_eq!(snapshot.matcher().strategy(), "cite-key");
    }

    #[test]
    fn test_legacy_journal_detection() {
        let legacy = load_journals("# comment\nJCSS|J. Comput. Syst. Sci.|Journal\n").unwrap();
        assert_eq!(legacy.get("jcss").unwrap().abbr, "J. Comput. Syst. Sci.");
        let ini = load_journals("[JCSS]\nfull = Journal\nabbr = J.\n").unwrap();
        assert_eq!(ini.get("jcss").unwrap().abbr, "J.");
        assert!(load_journals("").unwrap().is_empty());
    }
}
