//! Document directory listing and entry-to-document matching
//!
//! The listing is read once per check run. Matching strategies decide which
//! listed files belong to an entry and which expected documents are absent.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use bibvcs_bibtex::{Entry, FileFieldError};
use regex::Regex;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::{Expectation, Linking, LinkingConfig};

/// Relative paths (with `/` separators) of all documents, sorted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentListing {
    files: BTreeSet<String>,
}

impl DocumentListing {
    pub fn new<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            files: files.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Drop files matching any ignore rule
    ///
    /// A rule applies to the relative path and to each of its components, so
    /// `^\.` also hides files inside hidden directories.
    pub fn without_ignored(self, rules: &[Regex]) -> Self {
        let files = self
            .files
            .into_iter()
            .filter(|path| !is_ignored(path, rules))
            .collect();
        Self { files }
    }
}

fn is_ignored(path: &str, rules: &[Regex]) -> bool {
    rules.iter().any(|rule| {
        rule.is_match(path) || path.split('/').any(|component| rule.is_match(component))
    })
}

/// Whether the base name of `path` is `key` followed by any extensions
///
/// `smith2020.pdf` and `smith2020.ps.gz` both name the document of `smith2020`.
pub fn names_document(path: &str, key: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.strip_prefix(key) {
        Some(rest) => rest.is_empty() || rest.starts_with('.'),
        None => false,
    }
}

/// Supplies the list of files in the document directory
pub trait DocumentSource: Send + Sync {
    fn list(&self) -> std::io::Result<DocumentListing>;
}

/// Recursive listing of a directory on disk; a missing directory is empty
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl DocumentSource for DirectorySource {
    fn list(&self) -> std::io::Result<DocumentListing> {
        if !self.root.is_dir() {
            debug!("document directory {} does not exist", self.root.display());
            return Ok(DocumentListing::default());
        }
        let mut files = BTreeSet::new();
        for entry in WalkDir::new(&self.root).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if err.loop_ancestor().is_some() => {
                    warn!("skipping symlink loop: {err}");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .unwrap_or(entry.path());
            let relative: Vec<_> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect();
            files.insert(relative.join("/"));
        }
        debug!("listed {} files in {}", files.len(), self.root.display());
        Ok(DocumentListing { files })
    }
}

/// A fixed listing, for callers that already know the directory contents
#[derive(Debug, Clone, Default)]
pub struct StaticSource(pub DocumentListing);

impl DocumentSource for StaticSource {
    fn list(&self) -> std::io::Result<DocumentListing> {
        Ok(self.0.clone())
    }
}

/// Documents of one entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryDocuments {
    /// Listed files that belong to the entry
    pub found: Vec<String>,
    /// Expected documents that are not listed
    pub missing: Vec<String>,
}

/// Strategy that links entries to documents
pub trait DocumentMatcher: Send + Sync {
    /// Short name for messages
    fn strategy(&self) -> &'static str;

    fn documents(
        &self,
        entry: &Entry,
        listing: &DocumentListing,
    ) -> Result<EntryDocuments, FileFieldError>;
}

/// Build the matcher a database is configured for
pub fn matcher_for(config: &LinkingConfig) -> Box<dyn DocumentMatcher> {
    match config.strategy {
        Linking::CiteKey => Box::new(CiteKeyMatcher {
            expect: config.expect.clone(),
        }),
        Linking::FileField => Box::new(FileFieldMatcher {
            field: config.field.clone(),
            expect: config.expect.clone(),
        }),
    }
}

fn expects_document(expect: &Expectation, entry: &Entry) -> bool {
    match expect {
        Expectation::Always => true,
        Expectation::Never => false,
        Expectation::FieldPresent(field) => entry.contains(field),
    }
}

/// A document's base name equals the citation key; any extension
#[derive(Debug, Clone)]
pub struct CiteKeyMatcher {
    pub expect: Expectation,
}

impl DocumentMatcher for CiteKeyMatcher {
    fn strategy(&self) -> &'static str {
        "cite-key"
    }

    fn documents(
        &self,
        entry: &Entry,
        listing: &DocumentListing,
    ) -> Result<EntryDocuments, FileFieldError> {
        let found: Vec<String> = listing
            .iter()
            .filter(|path| names_document(path, entry.key()))
            .map(str::to_string)
            .collect();
        let missing = if found.is_empty() && expects_document(&self.expect, entry) {
            vec![format!("{}.*", entry.key())]
        } else {
            Vec::new()
        };
        Ok(EntryDocuments { found, missing })
    }
}

/// Documents are the paths in a JabRef-style file field
#[derive(Debug, Clone)]
pub struct FileFieldMatcher {
    pub field: String,
    pub expect: Expectation,
}

impl DocumentMatcher for FileFieldMatcher {
    fn strategy(&self) -> &'static str {
        "file-field"
    }

    fn documents(
        &self,
        entry: &Entry,
        listing: &DocumentListing,
    ) -> Result<EntryDocuments, FileFieldError> {
        let linked = entry.linked_files(&self.field)?;
        let mut documents = EntryDocuments::default();
        if linked.is_empty() && expects_document(&self.expect, entry) {
            documents.missing.push(format!("<{} field>", self.field));
        }
        for path in linked {
            let path = path.replace('\\', "/");
            if listing.contains(&path) {
                documents.found.push(path);
            } else {
                documents.missing.push(path);
            }
        }
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing() -> DocumentListing {
        DocumentListing::new([
            "smith2020.pdf",
            "sub/smith2020.djvu",
            "orphan.pdf",
            "notes.txt",
            "jones2021.ps.gz",
        ])
    }

    #[test]
    fn test_names_document() {
        assert!(names_document("a/b/smith2020.pdf", "smith2020"));
        assert!(names_document("smith2020.ps.gz", "smith2020"));
        assert!(names_document("smith.2020.pdf", "smith.2020"));
        assert!(names_document("noext", "noext"));
        assert!(!names_document("smith2020a.pdf", "smith2020"));
        assert!(!names_document("sub.smith2020/x.pdf", "smith2020"));
        assert!(!names_document("xsmith2020.pdf", "smith2020"));
    }

    #[test]
    fn test_ignore_rules_apply_to_components() {
        let rules = vec![Regex::new(r"^\.").unwrap(), Regex::new(r"^Thumbs\.db$").unwrap()];
        let listing = DocumentListing::new([".git/config", "a/Thumbs.db", ".DS_Store", "a/x.pdf"])
            .without_ignored(&rules);
        assert_eq!(listing.iter().collect::<Vec<_>>(), vec!["a/x.pdf"]);
    }

    #[test]
    fn test_cite_key_matcher() {
        let matcher = CiteKeyMatcher {
            expect: Expectation::FieldPresent("file".into()),
        };
        let smith = Entry::new("article", "smith2020");
        let docs = matcher.documents(&smith, &listing()).unwrap();
        assert_eq!(docs.found, vec!["smith2020.pdf", "sub/smith2020.djvu"]);
        assert!(docs.missing.is_empty());

        let jones = Entry::new("article", "jones2021").with_field("file", "jones2021.ps.gz");
        let docs = matcher.documents(&jones, &listing()).unwrap();
        assert_eq!(docs.found, vec!["jones2021.ps.gz"]);
        assert!(docs.missing.is_empty());

        let doe = Entry::new("article", "doe2019");
        assert!(matcher.documents(&doe, &listing()).unwrap().missing.is_empty());
        let doe = doe.with_field("file", "doe2019.pdf");
        assert_eq!(
            matcher.documents(&doe, &listing()).unwrap().missing,
            vec!["doe2019.*"]
        );
    }

    #[test]
    fn test_file_field_matcher() {
        let matcher = FileFieldMatcher {
            field: "file".into(),
            expect: Expectation::Never,
        };
        let entry = Entry::new("article", "k")
            .with_field("file", ":smith2020.pdf:PDF;:sub\\missing.pdf:PDF");
        let docs = matcher.documents(&entry, &listing()).unwrap();
        assert_eq!(docs.found, vec!["smith2020.pdf"]);
        assert_eq!(docs.missing, vec!["sub/missing.pdf"]);

        let always = FileFieldMatcher {
            field: "file".into(),
            expect: Expectation::Always,
        };
        let bare = Entry::new("misc", "bare");
        assert_eq!(
            always.documents(&bare, &listing()).unwrap().missing,
            vec!["<file field>"]
        );
    }

    #[test]
    fn test_directory_source() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("a.pdf"), b"").unwrap();
        std::fs::write(dir.path().join("sub").join("b.pdf"), b"").unwrap();

        let listing = DirectorySource::new(dir.path()).list().unwrap();
        assert_eq!(listing.iter().collect::<Vec<_>>(), vec!["a.pdf", "sub/b.pdf"]);

        let missing = DirectorySource::new(dir.path().join("nope")).list().unwrap();
        assert!(missing.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_directory_source_skips_symlink_loops() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("b.pdf"), b"").unwrap();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("sub").join("back")).unwrap();

        let listing = DirectorySource::new(dir.path()).list().unwrap();
        assert_eq!(listing.iter().collect::<Vec<_>>(), vec!["sub/b.pdf"]);
    }
}
