//! BibTeX entry and macro data structures

use std::fmt;
use std::sync::Arc;

use crate::value::FieldValue;

/// Byte range into a source buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Original text of a block, kept as a range into the shared source buffer
#[derive(Clone, PartialEq, Eq)]
pub struct Verbatim {
    source: Arc<str>,
    span: Span,
}

impl Verbatim {
    pub(crate) fn new(source: Arc<str>, span: Span) -> Self {
        debug_assert!(span.end <= source.len());
        Self { source, span }
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub fn as_str(&self) -> &str {
        &self.source[self.span.start..self.span.end]
    }
}

impl fmt::Debug for Verbatim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Verbatim")
            .field("span", &self.span)
            .field("text", &self.as_str())
            .finish()
    }
}

/// A single field of an entry; the name is stored lowercase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub value: FieldValue,
}

/// A parsed BibTeX entry
///
/// Entries coming out of the parser carry their verbatim source text. Any
/// mutation drops it, after which the formatter regenerates the entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    entry_type: String,
    key: String,
    fields: Vec<Field>,
    verbatim: Option<Verbatim>,
}

impl Entry {
    /// Create a new, programmatic entry
    pub fn new(entry_type: &str, key: impl Into<String>) -> Self {
        Self {
            entry_type: entry_type.to_lowercase(),
            key: key.into(),
            fields: Vec::new(),
            verbatim: None,
        }
    }

    pub(crate) fn parsed(
        entry_type: String,
        key: String,
        fields: Vec<Field>,
        verbatim: Verbatim,
    ) -> Self {
        Self {
            entry_type,
            key,
            fields,
            verbatim: Some(verbatim),
        }
    }

    /// Builder-style field insertion
    pub fn with_field(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Entry type, lowercase (`article`, `book`, ...)
    pub fn entry_type(&self) -> &str {
        &self.entry_type
    }

    /// Citation key, case preserved
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Get a field value by name (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        let name = name.to_lowercase();
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| &f.value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Literal text of a field if it contains no macro references
    pub fn literal(&self, name: &str) -> Option<String> {
        self.get(name).and_then(FieldValue::literal)
    }

    /// Set a field, replacing an existing one in place. Drops the verbatim text.
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) {
        let name = name.to_lowercase();
        let value = value.into();
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(field) => field.value = value,
            None => self.fields.push(Field { name, value }),
        }
        self.verbatim = None;
    }

    /// Remove a field. Drops the verbatim text only if something was removed.
    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        let name = name.to_lowercase();
        let pos = self.fields.iter().position(|f| f.name == name)?;
        self.verbatim = None;
        Some(self.fields.remove(pos).value)
    }

    /// Original source text, if the entry is unmodified since parsing
    pub fn verbatim(&self) -> Option<&str> {
        self.verbatim.as_ref().map(Verbatim::as_str)
    }

    /// Forget the source text so the entry is written in canonical form
    pub fn clear_verbatim(&mut self) {
        self.verbatim = None;
    }

    /// Location of the entry in the parsed source
    pub fn span(&self) -> Option<Span> {
        self.verbatim.as_ref().map(Verbatim::span)
    }

    /// Documents referenced by a JabRef-style file field
    ///
    /// The field holds `description:path:type` items separated by `;`, with
    /// `\;` and `\:` escapes. A bare path without colons is accepted too.
    pub fn linked_files(&self, field: &str) -> Result<Vec<String>, FileFieldError> {
        let Some(value) = self.get(field) else {
            return Ok(Vec::new());
        };
        let text = value.literal().ok_or_else(|| FileFieldError {
            key: self.key.clone(),
            value: value.to_string(),
        })?;
        let mut files = Vec::new();
        for item in split_escaped(&text, ';') {
            if item.trim().is_empty() {
                continue;
            }
            let parts = split_escaped(&item, ':');
            let path = match parts.as_slice() {
                [path] => path.as_str(),
                [_description, path, _kind] => path.as_str(),
                _ => {
                    return Err(FileFieldError {
                        key: self.key.clone(),
                        value: text.clone(),
                    })
                }
            };
            if path.is_empty() {
                return Err(FileFieldError {
                    key: self.key.clone(),
                    value: text.clone(),
                });
            }
            files.push(path.to_string());
        }
        Ok(files)
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.entry_type, self.key)
    }
}

/// A file field that does not follow the `description:path:type` format
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed file field in entry '{key}': {value}")]
pub struct FileFieldError {
    pub key: String,
    pub value: String,
}

/// Split on `sep`; `\` followed by `sep` is an escaped separator
fn split_escaped(text: &str, sep: char) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' && chars.peek() == Some(&sep) {
            chars.next();
            current.push(sep);
        } else if c == sep {
            items.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    items.push(current);
    items
}

/// A `@string{name = value}` definition; the name is stored lowercase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroDefinition {
    name: String,
    value: FieldValue,
    verbatim: Option<Verbatim>,
}

impl MacroDefinition {
    pub fn new(name: &str, value: impl Into<FieldValue>) -> Self {
        Self {
            name: name.to_lowercase(),
            value: value.into(),
            verbatim: None,
        }
    }

    pub(crate) fn parsed(name: String, value: FieldValue, verbatim: Verbatim) -> Self {
        Self {
            name,
            value,
            verbatim: Some(verbatim),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    pub fn set_value(&mut self, value: impl Into<FieldValue>) {
        self.value = value.into();
        self.verbatim = None;
    }

    pub fn verbatim(&self) -> Option<&str> {
        self.verbatim.as_ref().map(Verbatim::as_str)
    }

    pub fn clear_verbatim(&mut self) {
        self.verbatim = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_field_access() {
        let entry = Entry::new("ARTICLE", "Smith2024")
            .with_field("Title", "A Great Paper")
            .with_field("YEAR", FieldValue::number("2024"));

        assert_eq!(entry.entry_type(), "article");
        assert_eq!(entry.key(), "Smith2024");
        assert_eq!(entry.literal("title").as_deref(), Some("A Great Paper"));
        assert_eq!(entry.literal("Year").as_deref(), Some("2024"));
        assert!(entry.get("doi").is_none());
    }

    #[test]
    fn test_set_replaces_in_place() {
        let mut entry = Entry::new("misc", "k")
            .with_field("a", "1")
            .with_field("b", "2");
        entry.set("A", "3");
        let names: Vec<_> = entry.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(entry.literal("a").as_deref(), Some("3"));
    }

    #[test]
    fn test_linked_files_jabref_format() {
        let entry = Entry::new("article", "k").with_field(
            "file",
            r":papers/smith.pdf:PDF;Slides:talks/smith\;v2.pdf:PDF;:C\:/doc.pdf:PDF",
        );
        assert_eq!(
            entry.linked_files("file").unwrap(),
            vec![
                "papers/smith.pdf".to_string(),
                "talks/smith;v2.pdf".to_string(),
                "C:/doc.pdf".to_string()
            ]
        );
    }

    #[test]
    fn test_linked_files_plain_path() {
        let entry = Entry::new("article", "k").with_field("file", "smith.pdf");
        assert_eq!(entry.linked_files("file").unwrap(), vec!["smith.pdf"]);
        assert!(entry.linked_files("pdf").unwrap().is_empty());
    }

    #[test]
    fn test_linked_files_malformed() {
        let entry = Entry::new("article", "k").with_field("file", "a:b");
        assert!(entry.linked_files("file").is_err());
    }
}
