//! Entry-level and JabRef hygiene checks

use std::sync::Arc;

use bibvcs_bibtex::{is_month_macro, Bibliography, Entry, ValuePart};

use super::{CheckFn, CheckResult};
use crate::database::DatabaseSnapshot;

pub const ASCII_FILENAMES: &str = "ascii-filenames";
pub const MONTH_MACROS: &str = "month-macros";
pub const REQUIRED_FIELDS: &str = "required-fields";
pub const MARKED_ENTRIES: &str = "marked-entries";
pub const JABREF_FILE_DIRECTORY: &str = "jabref-file-directory";
pub const CROSSREFS: &str = "crossrefs";

const JABREF_FILE_DIRECTORY_PREFIX: &str = "jabref-meta: fileDirectory:";

pub(crate) fn checks() -> Vec<(&'static str, Arc<CheckFn>)> {
    vec![
        (ASCII_FILENAMES, Arc::new(ascii_filenames) as Arc<CheckFn>),
        (MONTH_MACROS, Arc::new(month_macros) as Arc<CheckFn>),
        (REQUIRED_FIELDS, Arc::new(required_fields) as Arc<CheckFn>),
        (MARKED_ENTRIES, Arc::new(marked_entries) as Arc<CheckFn>),
        (JABREF_FILE_DIRECTORY, Arc::new(jabref_file_directory) as Arc<CheckFn>),
        (CROSSREFS, Arc::new(crossrefs) as Arc<CheckFn>),
    ]
}

/// A required field, or a set of alternatives of which one must be present
#[derive(Debug, Clone, Copy)]
enum Requirement {
    Field(&'static str),
    OneOf(&'static [&'static str]),
}

use Requirement::{Field, OneOf};

const AUTHOR_OR_EDITOR: Requirement = OneOf(&["author", "editor"]);

/// Required fields per entry type; `None` for types we know nothing about
fn requirements(entry_type: &str) -> Option<&'static [Requirement]> {
    let fields: &'static [Requirement] = match entry_type {
        "article" => &[Field("author"), Field("title"), Field("journal"), Field("year")],
        "book" => &[AUTHOR_OR_EDITOR, Field("title"), Field("publisher"), Field("year")],
        "incollection" => &[
            Field("author"),
            Field("title"),
            Field("booktitle"),
            Field("publisher"),
            Field("year"),
        ],
        "inproceedings" => &[Field("author"), Field("title"), Field("booktitle"), Field("year")],
        "mastersthesis" | "phdthesis" => {
            &[Field("author"), Field("title"), Field("school"), Field("year")]
        }
        "misc" => &[],
        "techreport" => &[Field("author"), Field("title"), Field("institution"), Field("year")],
        "unpublished" => &[Field("author"), Field("title"), Field("note")],
        "online" => &[AUTHOR_OR_EDITOR, Field("title"), Field("year"), Field("url")],
        _ => return None,
    };
    Some(fields)
}

/// The entry has `field`, directly or through its crossref chain
fn has_field(bibliography: &Bibliography, entry: &Entry, field: &str) -> bool {
    entry.contains(field)
        || bibliography
            .crossref_target(entry)
            .is_some_and(|target| bibliography.effective_field(&target, field).is_some())
}

/// Document file names must be ASCII
pub fn ascii_filenames(snapshot: &DatabaseSnapshot<'_>) -> Vec<CheckResult> {
    snapshot
        .documents()
        .iter()
        .filter(|path| !path.is_ascii())
        .map(|path| {
            CheckResult::error(format!("The file name '{path}' contains non-ASCII characters"))
                .with_file(path)
        })
        .collect()
}

/// `month` is a month macro, or month macros separated by `"/"`
pub fn month_macros(snapshot: &DatabaseSnapshot<'_>) -> Vec<CheckResult> {
    let mut results = Vec::new();
    for entry in snapshot.bibliography().entries() {
        let Some(month) = entry.get("month") else {
            continue;
        };
        let key = entry.key();
        if let Some(text) = month.literal() {
            results.push(
                CheckResult::error(format!(
                    "Month field in entry '{key}' contains the string '{text}' instead of a month macro"
                ))
                .with_entry(key),
            );
            continue;
        }

        let parts = month.parts();
        if parts.len() % 2 != 1 {
            results.push(
                CheckResult::error(format!(
                    "Invalid month definition '{month}' in '{key}': must be a single month macro or of the form 'mar # \"/\" # apr'"
                ))
                .with_entry(key),
            );
            continue;
        }

        for (i, part) in parts.iter().enumerate() {
            let problem = if i % 2 == 0 {
                match part.macro_name() {
                    Some(name) if is_month_macro(name) => None,
                    Some(name) => Some(format!("'{name}' is not a month macro")),
                    None => Some(format!("expected a month macro but got {part}")),
                }
            } else {
                match part {
                    ValuePart::Braced(text) | ValuePart::Quoted(text) if text.trim() == "/" => None,
                    _ => Some(format!("expected '/' but got {part}")),
                }
            };
            if let Some(problem) = problem {
                results.push(
                    CheckResult::error(format!(
                        "Invalid month definition '{month}' in '{key}': {problem}"
                    ))
                    .with_entry(key),
                );
            }
        }
    }
    results
}

/// Every entry of a known type carries the fields its type requires
pub fn required_fields(snapshot: &DatabaseSnapshot<'_>) -> Vec<CheckResult> {
    let bibliography = snapshot.bibliography();
    let mut results = Vec::new();
    for entry in bibliography.entries() {
        let key = entry.key();
        let entry_type = entry.entry_type();
        let Some(required) = requirements(entry_type) else {
            results.push(
                CheckResult::warning(format!(
                    "Entry '{key}': required fields for type '{entry_type}' unknown"
                ))
                .with_entry(key),
            );
            continue;
        };
        for requirement in required {
            let message = match requirement {
                Field(field) if !has_field(bibliography, entry, field) => format!(
                    "Entry '{key}' of type '{entry_type}' requires field '{field}'"
                ),
                OneOf(fields) if !fields.iter().any(|f| has_field(bibliography, entry, f)) => {
                    format!(
                        "Entry '{key}' of type '{entry_type}' requires one of the fields: {}",
                        fields.join(", ")
                    )
                }
                _ => continue,
            };
            results.push(CheckResult::error(message).with_entry(key));
        }
    }
    results
}

/// JabRef's transient mark must not end up in the shared database
pub fn marked_entries(snapshot: &DatabaseSnapshot<'_>) -> Vec<CheckResult> {
    snapshot
        .bibliography()
        .entries()
        .iter()
        .filter_map(|entry| {
            let mark = entry.get("__markedentry")?;
            Some(
                CheckResult::error(format!(
                    "Entry '{}' is marked in JabRef: {}",
                    entry.key(),
                    mark
                ))
                .with_entry(entry.key()),
            )
        })
        .collect()
}

/// JabRef's file directory setting matches the configured document directory
pub fn jabref_file_directory(snapshot: &DatabaseSnapshot<'_>) -> Vec<CheckResult> {
    let expected = format!("{};", snapshot.config().documents);
    snapshot
        .bibliography()
        .comments()
        .iter()
        .filter_map(|comment| comment.trim().strip_prefix(JABREF_FILE_DIRECTORY_PREFIX))
        .filter(|directory| *directory != expected)
        .map(|directory| {
            CheckResult::error(format!(
                "JabRef fileDirectory '{directory}' does not coincide with the configured '{expected}'"
            ))
        })
        .collect()
}

/// Every crossref names an existing entry
pub fn crossrefs(snapshot: &DatabaseSnapshot<'_>) -> Vec<CheckResult> {
    let bibliography = snapshot.bibliography();
    bibliography
        .entries()
        .iter()
        .filter_map(|entry| {
            let target = bibliography.crossref_target(entry)?;
            if bibliography.contains_key(&target) {
                return None;
            }
            Some(
                CheckResult::error(format!(
                    "Entry '{}' cross-references unknown entry '{}'",
                    entry.key(),
                    target
                ))
                .with_entry(entry.key()),
            )
        })
        .collect()
}
