//! Document, macro and key checks

use std::collections::HashSet;
use std::sync::Arc;

use bibvcs_bibtex::{JournalStyle, MacroIssue};

use super::{CheckFn, CheckResult};
use crate::database::DatabaseSnapshot;

pub const ORPHAN_DOCUMENTS: &str = "orphan-documents";
pub const MISSING_DOCUMENTS: &str = "missing-documents";
pub const UNRESOLVED_MACROS: &str = "unresolved-macros";
pub const DUPLICATE_KEYS: &str = "duplicate-keys";
pub const JOURNAL_MACROS: &str = "journal-macros";

pub(crate) fn checks() -> Vec<(&'static str, Arc<CheckFn>)> {
    vec![
        (ORPHAN_DOCUMENTS, Arc::new(orphan_documents) as Arc<CheckFn>),
        (MISSING_DOCUMENTS, Arc::new(missing_documents) as Arc<CheckFn>),
        (UNRESOLVED_MACROS, Arc::new(unresolved_macros) as Arc<CheckFn>),
        (DUPLICATE_KEYS, Arc::new(duplicate_keys) as Arc<CheckFn>),
        (JOURNAL_MACROS, Arc::new(journal_macros) as Arc<CheckFn>),
    ]
}

/// Every document must belong to at least one entry
pub fn orphan_documents(snapshot: &DatabaseSnapshot<'_>) -> Vec<CheckResult> {
    let severity = snapshot.config().checks.orphan_severity;
    let mut claimed: HashSet<String> = HashSet::new();
    for entry in snapshot.bibliography().entries() {
        // Malformed file fields are reported by the missing-documents check
        if let Ok(documents) = snapshot.matcher().documents(entry, snapshot.documents()) {
            claimed.extend(documents.found);
        }
    }

    snapshot
        .documents()
        .iter()
        .filter(|file| !claimed.contains(*file))
        .map(|file| {
            CheckResult::new(
                severity,
                format!("Document '{file}' does not belong to any entry"),
            )
            .with_file(file)
        })
        .collect()
}

/// Every document an entry expects must exist
pub fn missing_documents(snapshot: &DatabaseSnapshot<'_>) -> Vec<CheckResult> {
    let mut results = Vec::new();
    for entry in snapshot.bibliography().entries() {
        match snapshot.matcher().documents(entry, snapshot.documents()) {
            Ok(documents) => {
                for missing in documents.missing {
                    results.push(
                        CheckResult::error(format!(
                            "Entry '{}' expects document '{}', which is not in the document directory",
                            entry.key(),
                            missing
                        ))
                        .with_entry(entry.key())
                        .with_file(missing),
                    );
                }
            }
            Err(err) => results.push(CheckResult::error(err.to_string()).with_entry(entry.key())),
        }
    }
    results
}

/// Every macro reference resolves, and no macro is defined in terms of itself
pub fn unresolved_macros(snapshot: &DatabaseSnapshot<'_>) -> Vec<CheckResult> {
    let bibliography = snapshot.bibliography();
    let journals = snapshot.journal_macros();
    let resolver = bibliography.resolver().with_source(&journals);
    let mut results = Vec::new();

    for definition in bibliography.macros() {
        for issue in resolver.resolve_macro(definition.name()).issues {
            let message = match &issue {
                MacroIssue::Undefined { name } => format!(
                    "Macro '{}' refers to undefined macro '{}'",
                    definition.name(),
                    name
                ),
                MacroIssue::Cyclic { chain, .. } => format!(
                    "Macro '{}' is defined in terms of itself ({})",
                    definition.name(),
                    chain.join(" -> ")
                ),
            };
            results.push(CheckResult::error(message));
        }
    }

    for entry in bibliography.entries() {
        for field in entry.fields() {
            if field.value.macro_refs().next().is_none() {
                continue;
            }
            for issue in resolver.resolve(&field.value).issues {
                let message = match &issue {
                    MacroIssue::Undefined { name } => format!(
                        "The macro '{}' used for field '{}' in entry '{}' is defined neither in the database nor in the journal registry",
                        name,
                        field.name,
                        entry.key()
                    ),
                    MacroIssue::Cyclic { name, .. } => format!(
                        "The macro '{}' used for field '{}' in entry '{}' is cyclic",
                        name,
                        field.name,
                        entry.key()
                    ),
                };
                results.push(CheckResult::error(message).with_entry(entry.key()));
            }
        }
    }
    results
}

/// No two entries share a citation key
pub fn duplicate_keys(snapshot: &DatabaseSnapshot<'_>) -> Vec<CheckResult> {
    snapshot
        .bibliography()
        .duplicate_keys()
        .into_iter()
        .map(|(key, count)| {
            CheckResult::error(format!("Citation key '{key}' is used by {count} entries"))
                .with_entry(key)
        })
        .collect()
}

/// Journal fields only use registry macros, and every registry entry is used
pub fn journal_macros(snapshot: &DatabaseSnapshot<'_>) -> Vec<CheckResult> {
    let journals = snapshot.journals();
    let fields = &snapshot.config().checks.journal_fields;
    let mut used: HashSet<String> = HashSet::new();
    let mut results = Vec::new();

    for entry in snapshot.bibliography().entries() {
        for field in fields {
            let Some(value) = entry.get(field) else {
                continue;
            };
            for name in value.macro_refs() {
                used.insert(name.to_string());
                if !journals.contains(name) {
                    results.push(
                        CheckResult::error(format!(
                            "Journal macro '{}' in field '{}' of entry '{}' is not in the journal registry",
                            name,
                            field,
                            entry.key()
                        ))
                        .with_entry(entry.key()),
                    );
                }
            }
        }
    }

    for journal in journals.iter() {
        if !used.contains(&journal.macro_name.to_lowercase()) {
            results.push(CheckResult::warning(format!(
                "Journal '{}' ({}) is not used by any entry",
                journal.macro_name,
                journal.display_name(JournalStyle::Full)
            )));
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::{CheckEngine, Severity};
    use crate::config::{DatabaseConfig, Expectation, Linking};
    use crate::database::Database;
    use crate::documents::{DocumentListing, StaticSource};
    use bibvcs_bibtex::{Bibliography, Journal, JournalRegistry};

    fn database(bib: &str, config: DatabaseConfig, journals: JournalRegistry) -> Database {
        Database::new(".", config, Bibliography::parse(bib).unwrap(), journals)
    }

    fn run(
        check: fn(&DatabaseSnapshot<'_>) -> Vec<CheckResult>,
        db: &Database,
        files: &[&str],
    ) -> Vec<CheckResult> {
        let snapshot = db
            .snapshot_with(&StaticSource(DocumentListing::new(files.iter().copied())))
            .unwrap();
        check(&snapshot)
    }

    fn registry() -> JournalRegistry {
        let mut journals = JournalRegistry::new();
        journals
            .add(Journal::new("JCSS", "Journal of Computer and System Sciences", "J. Comput. Syst. Sci."))
            .unwrap();
        journals
            .add(Journal::new("TCS", "Theoretical Computer Science", "Theor. Comput. Sci."))
            .unwrap();
        journals
    }

    // === Documents ===

    #[test]
    fn test_orphans_use_configured_severity() {
        let mut config = DatabaseConfig::default();
        config.checks.orphan_severity = Severity::Error;
        let db = database("@misc{smith2020}\n", config, JournalRegistry::new());
        let results = run(
            orphan_documents,
            &db,
            &["smith2020.ps.gz", "sub/smith2020.pdf", "stray.pdf"],
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].severity, Severity::Error);
        assert_eq!(results[0].files, vec!["stray.pdf"]);
    }

    #[test]
    fn test_missing_documents_by_cite_key() {
        let db = database(
            "@misc{a, file = {a.pdf}}\n@misc{b, file = {b.pdf}}\n@misc{c}\n",
            DatabaseConfig::default(),
            JournalRegistry::new(),
        );
        let results = run(missing_documents, &db, &["a.djvu"]);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].severity, Severity::Error);
        assert_eq!(results[0].entries, vec!["b"]);
        assert_eq!(results[0].files, vec!["b.*"]);
    }

    #[test]
    fn test_file_field_linking_through_engine() {
        let mut config = DatabaseConfig::default();
        config.linking.strategy = Linking::FileField;
        config.linking.expect = Expectation::Always;
        let db = database(
            "@misc{a, file = {:docs/a.pdf:PDF}}\n@misc{b, file = {:b.pdf:PDF}}\n@misc{c}\n",
            config,
            JournalRegistry::new(),
        );
        let listing = StaticSource(DocumentListing::new(["docs/a.pdf", "c.pdf"]));
        let snapshot = db.snapshot_with(&listing).unwrap();
        assert_eq!(snapshot.matcher().strategy(), "file-field");

        let report = CheckEngine::with_standard_checks(&db.config().checks).run_all(&snapshot);
        let missing: Vec<_> = report.by_check(MISSING_DOCUMENTS).collect();
        assert_eq!(missing.len(), 2);
        assert_eq!(missing[0].entries, vec!["b"]);
        assert_eq!(missing[0].files, vec!["b.pdf"]);
        assert_eq!(missing[1].entries, vec!["c"]);
        assert_eq!(missing[1].files, vec!["<file field>"]);

        // A file named after the key is not linked without a file field entry
        let orphans: Vec<_> = report.by_check(ORPHAN_DOCUMENTS).collect();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].files, vec!["c.pdf"]);
        assert!(!report.is_clean());
    }

    // === Macros and keys ===

    #[test]
    fn test_unresolved_macro_in_definition() {
        let db = database(
            "@string{full = base # \" Letters\"}\n@misc{k, note = full}\n",
            DatabaseConfig::default(),
            JournalRegistry::new(),
        );
        let results = run(unresolved_macros, &db, &[]);
        assert!(results
            .iter()
            .any(|r| r.entries.is_empty() && r.message.contains("undefined macro 'base'")));
        assert!(results.iter().any(|r| r.entries == vec!["k"]));
        assert!(results.iter().all(|r| r.severity == Severity::Error));
    }

    #[test]
    fn test_journal_macros_resolve_through_registry() {
        let db = database("@article{a, journal = tcs}\n", DatabaseConfig::default(), registry());
        assert!(run(unresolved_macros, &db, &[]).is_empty());
    }

    #[test]
    fn test_duplicate_keys() {
        let mut bibliography = Bibliography::parse("@misc{a}\n@misc{b}\n").unwrap();
        bibliography.merge(Bibliography::parse("@misc{a}\n").unwrap());
        let db = Database::in_memory(bibliography);
        let results = run(duplicate_keys, &db, &[]);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entries, vec!["a"]);
        assert!(results[0].message.contains("2 entries"));
    }

    // === Journal registry ===

    #[test]
    fn test_unregistered_journal_macro() {
        let db = database(
            "@article{a, journal = JCSS}\n@article{b, journal = IEEECL}\n@article{c, journal = tcs}\n",
            DatabaseConfig::default(),
            registry(),
        );
        let results = run(journal_macros, &db, &[]);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].severity, Severity::Error);
        assert_eq!(results[0].entries, vec!["b"]);
        assert!(results[0].message.contains("'ieeecl'"));
        assert!(results[0].message.contains("'journal'"));
    }

    #[test]
    fn test_unused_journal_warning() {
        let db = database("@article{a, journal = jcss}\n", DatabaseConfig::default(), registry());
        let results = run(journal_macros, &db, &[]);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].severity, Severity::Warning);
        assert!(results[0].entries.is_empty());
        assert!(results[0]
            .message
            .contains("'TCS' (Theoretical Computer Science)"));
    }

    #[test]
    fn test_journal_fields_are_configurable() {
        let mut config = DatabaseConfig::default();
        config.checks.journal_fields = vec!["booktitle".to_string()];
        let db = database(
            "@article{a, journal = nosuch, booktitle = jcss # tcs}\n",
            config,
            registry(),
        );
        assert!(run(journal_macros, &db, &[]).is_empty());
    }
}
