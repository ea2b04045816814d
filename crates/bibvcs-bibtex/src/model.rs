//! Bibliography model
//!
//! Owns all entries and macro definitions of one bib file together with the
//! layout needed to write the file back. Unmodified entries are written from
//! their verbatim source text, so serializing a freshly parsed model
//! reproduces the input up to trailing whitespace.

use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use crate::entry::{Entry, MacroDefinition};
use crate::formatter::{
    format_entry, format_macro_definition, format_preamble, normalize_trailing_whitespace,
    strip_grouping,
};
use crate::parser::{self, Block, ParseError, ParsedBibliography};
use crate::resolve::{MacroSource, ResolvedValue, Resolver};
use crate::value::FieldValue;

/// Error type for programmatic changes to the model
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("no entry with key '{0}'")]
    UnknownEntry(String),
    #[error("an entry with key '{0}' already exists")]
    DuplicateKey(String),
    #[error("invalid name '{0}'")]
    InvalidName(String),
    #[error("value of '{name}' cannot be written back: {part}")]
    UnwritableValue { name: String, part: String },
}

fn check_writable(name: &str, value: &FieldValue) -> Result<(), ModelError> {
    match value.unwritable_part() {
        Some(part) => Err(ModelError::UnwritableValue {
            name: name.to_string(),
            part: FieldValue::new(vec![part.clone()]).to_string(),
        }),
        None => Ok(()),
    }
}

/// One piece of the file, in order
#[derive(Debug, Clone)]
enum Segment {
    /// Text written as is: implicit comments, @comment and @preamble blocks
    Text(String),
    /// Index into `entries`
    Entry(usize),
    /// Index into `macros`
    Macro(usize),
}

/// A macro reference made by an entry field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MacroReference<'a> {
    pub key: &'a str,
    pub field: &'a str,
    pub name: &'a str,
}

/// Structured, queryable view of a bib file
#[derive(Debug, Clone, Default)]
pub struct Bibliography {
    entries: Vec<Entry>,
    key_index: HashMap<String, usize>,
    type_index: BTreeMap<String, Vec<usize>>,
    macros: Vec<MacroDefinition>,
    macro_index: HashMap<String, usize>,
    preamble: Option<FieldValue>,
    comments: Vec<String>,
    layout: Vec<Segment>,
}

impl Bibliography {
    /// Build a model from separately constructed parts
    ///
    /// The layout is generated: preamble, then macros, then entries. Entries
    /// that carry verbatim text are still written verbatim.
    pub fn build(
        entries: Vec<Entry>,
        macros: Vec<MacroDefinition>,
        preamble: Option<FieldValue>,
    ) -> Self {
        let mut layout = Vec::new();
        if let Some(value) = &preamble {
            layout.push(Segment::Text(format_preamble(value)));
            layout.push(Segment::Text("\n\n".to_string()));
        }
        for i in 0..macros.len() {
            layout.push(Segment::Macro(i));
            layout.push(Segment::Text("\n".to_string()));
        }
        if !macros.is_empty() {
            layout.push(Segment::Text("\n".to_string()));
        }
        for i in 0..entries.len() {
            layout.push(Segment::Entry(i));
            layout.push(Segment::Text("\n\n".to_string()));
        }

        let mut bibliography = Self {
            entries,
            macros,
            preamble,
            layout,
            ..Self::default()
        };
        bibliography.reindex();
        bibliography
    }

    /// Build a model that keeps the complete layout of a parsed file
    pub fn from_parsed(parsed: ParsedBibliography) -> Self {
        let preamble = parsed.preamble();
        let mut bibliography = Self {
            preamble,
            ..Self::default()
        };

        for block in parsed.into_blocks() {
            match block {
                Block::Entry(entry) => {
                    bibliography.layout.push(Segment::Entry(bibliography.entries.len()));
                    bibliography.entries.push(entry);
                }
                Block::Macro(definition) => {
                    bibliography.layout.push(Segment::Macro(bibliography.macros.len()));
                    bibliography.macros.push(definition);
                }
                Block::Comment(comment) => {
                    bibliography
                        .layout
                        .push(Segment::Text(comment.verbatim.as_str().to_string()));
                    bibliography.comments.push(comment.text);
                }
                Block::Preamble(preamble) => {
                    bibliography
                        .layout
                        .push(Segment::Text(preamble.verbatim.as_str().to_string()));
                }
                Block::Text(text) => bibliography.layout.push(Segment::Text(text.as_str().to_string())),
            }
        }
        bibliography.reindex();
        bibliography
    }

    /// Parse BibTeX text into a model
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        parser::parse(input).map(Self::from_parsed)
    }

    fn reindex(&mut self) {
        self.key_index.clear();
        self.type_index.clear();
        for (i, entry) in self.entries.iter().enumerate() {
            self.key_index.entry(entry.key().to_string()).or_insert(i);
            self.type_index
                .entry(entry.entry_type().to_string())
                .or_default()
                .push(i);
        }
        self.macro_index.clear();
        for (i, definition) in self.macros.iter().enumerate() {
            // A later definition overrides an earlier one, as in BibTeX
            self.macro_index.insert(definition.name().to_string(), i);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in file order
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Look up an entry by citation key (case-sensitive)
    pub fn entry(&self, key: &str) -> Option<&Entry> {
        self.key_index.get(key).map(|&i| &self.entries[i])
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.key_index.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(Entry::key)
    }

    /// Entries of one type (case-insensitive)
    pub fn entries_by_type(&self, entry_type: &str) -> Vec<&Entry> {
        self.type_index
            .get(&entry_type.to_lowercase())
            .map(|indices| indices.iter().map(|&i| &self.entries[i]).collect())
            .unwrap_or_default()
    }

    /// Entry types present, sorted
    pub fn entry_types(&self) -> impl Iterator<Item = &str> {
        self.type_index.keys().map(String::as_str)
    }

    /// Entries matching an arbitrary predicate
    pub fn find<P>(&self, predicate: P) -> Vec<&Entry>
    where
        P: Fn(&Entry) -> bool,
    {
        self.entries.iter().filter(|e| predicate(e)).collect()
    }

    /// Entries whose `field` is present and satisfies `predicate`
    pub fn entries_with_field<P>(&self, field: &str, predicate: P) -> Vec<&Entry>
    where
        P: Fn(&FieldValue) -> bool,
    {
        self.entries
            .iter()
            .filter(|e| e.get(field).is_some_and(&predicate))
            .collect()
    }

    /// Keys that occur more than once, with their counts, in first-occurrence order
    pub fn duplicate_keys(&self) -> Vec<(&str, usize)> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for key in self.keys() {
            *counts.entry(key).or_default() += 1;
        }
        let mut duplicates = Vec::new();
        for key in self.keys() {
            if let Some(count) = counts.remove(key) {
                if count > 1 {
                    duplicates.push((key, count));
                }
            }
        }
        duplicates
    }

    pub fn macros(&self) -> &[MacroDefinition] {
        &self.macros
    }

    /// The effective definition of a macro (case-insensitive)
    pub fn macro_definition(&self, name: &str) -> Option<&MacroDefinition> {
        let i = match self.macro_index.get(name) {
            Some(&i) => i,
            None => *self.macro_index.get(&name.to_lowercase())?,
        };
        Some(&self.macros[i])
    }

    pub fn preamble(&self) -> Option<&FieldValue> {
        self.preamble.as_ref()
    }

    /// Bodies of `@comment` blocks
    pub fn comments(&self) -> &[String] {
        &self.comments
    }

    /// Every macro reference made by an entry field, in file order
    pub fn macro_references(&self) -> Vec<MacroReference<'_>> {
        let mut references = Vec::new();
        for entry in &self.entries {
            for field in entry.fields() {
                for name in field.value.macro_refs() {
                    references.push(MacroReference {
                        key: entry.key(),
                        field: &field.name,
                        name,
                    });
                }
            }
        }
        references
    }

    /// A resolver over this bibliography's macros and the builtin months
    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::new(self)
    }

    /// Resolve a field's value, substituting macros
    pub fn resolve_field(&self, key: &str, field: &str) -> Option<ResolvedValue> {
        let (_, value) = self.effective_field(key, field)?;
        Some(self.resolver().resolve(value))
    }

    /// The field as BibTeX sees it: the entry's own value, or the value
    /// inherited through its `crossref` chain. Returns the entry that
    /// actually holds the field.
    pub fn effective_field(&self, key: &str, field: &str) -> Option<(&Entry, &FieldValue)> {
        let mut visited: Vec<&str> = Vec::new();
        let mut current = self.entry(key)?;
        loop {
            if let Some(value) = current.get(field) {
                return Some((current, value));
            }
            visited.push(current.key());
            let parent_key = self.crossref_target(current)?;
            if visited.contains(&parent_key.as_str()) {
                return None;
            }
            current = self.entry(&parent_key)?;
        }
    }

    /// Human-readable text of a value
    ///
    /// Macros are substituted from this bibliography, then from `sources`
    /// (typically a journal registry in one style), and grouping braces are
    /// stripped. Unresolved macros are left as their names.
    pub fn textify(&self, value: &FieldValue, sources: &[&dyn MacroSource]) -> String {
        let resolver = sources
            .iter()
            .fold(self.resolver(), |resolver, source| resolver.with_source(*source));
        strip_grouping(&resolver.resolve(value).text)
    }

    /// Key named by an entry's `crossref` field, if any
    pub fn crossref_target(&self, entry: &Entry) -> Option<String> {
        let value = entry.get("crossref")?;
        let resolved = self.resolver().resolve(value);
        Some(resolved.text.trim().to_string())
    }

    /// Set a field on an entry; the entry is regenerated on the next serialization
    pub fn set_field(
        &mut self,
        key: &str,
        field: &str,
        value: impl Into<FieldValue>,
    ) -> Result<(), ModelError> {
        if !parser::is_valid_name(field) {
            return Err(ModelError::InvalidName(field.to_string()));
        }
        let value = value.into();
        check_writable(field, &value)?;
        let i = *self
            .key_index
            .get(key)
            .ok_or_else(|| ModelError::UnknownEntry(key.to_string()))?;
        self.entries[i].set(field, value);
        Ok(())
    }

    /// Remove a field from an entry
    pub fn remove_field(&mut self, key: &str, field: &str) -> Result<Option<FieldValue>, ModelError> {
        let i = *self
            .key_index
            .get(key)
            .ok_or_else(|| ModelError::UnknownEntry(key.to_string()))?;
        Ok(self.entries[i].remove(field))
    }

    /// Append a new entry; its key must not be taken
    pub fn add_entry(&mut self, entry: Entry) -> Result<(), ModelError> {
        if self.contains_key(entry.key()) {
            return Err(ModelError::DuplicateKey(entry.key().to_string()));
        }
        for field in entry.fields() {
            if !parser::is_valid_name(&field.name) {
                return Err(ModelError::InvalidName(field.name.clone()));
            }
            check_writable(&field.name, &field.value)?;
        }
        self.push_entry(entry);
        Ok(())
    }

    fn push_entry(&mut self, entry: Entry) {
        self.push_separator();
        self.layout.push(Segment::Entry(self.entries.len()));
        self.layout.push(Segment::Text("\n".to_string()));
        self.entries.push(entry);
        self.reindex();
    }

    /// Pad the layout so that the next item starts after a blank line
    fn push_separator(&mut self) {
        let separator = match self.layout.last() {
            None => "",
            Some(Segment::Text(text)) if text.ends_with("\n\n") || text.is_empty() => "",
            Some(Segment::Text(text)) if text.ends_with('\n') => "\n",
            Some(_) => "\n\n",
        };
        if !separator.is_empty() {
            self.layout.push(Segment::Text(separator.to_string()));
        }
    }

    fn insert_macro_segment(&mut self, index: usize) {
        // Macros go before the first entry so they are defined before use
        let at = self
            .layout
            .iter()
            .position(|s| matches!(s, Segment::Entry(_)))
            .unwrap_or(self.layout.len());
        self.layout.insert(at, Segment::Text("\n\n".to_string()));
        self.layout.insert(at, Segment::Macro(index));
    }

    /// Remove the first entry with this key
    pub fn remove_entry(&mut self, key: &str) -> Result<Entry, ModelError> {
        let i = *self
            .key_index
            .get(key)
            .ok_or_else(|| ModelError::UnknownEntry(key.to_string()))?;
        let removed = self.entries.remove(i);
        if let Some(pos) = self
            .layout
            .iter()
            .position(|s| matches!(s, Segment::Entry(j) if *j == i))
        {
            // Take the whitespace that separated the entry from its successor along
            let mut end = pos + 1;
            while matches!(self.layout.get(end), Some(Segment::Text(t)) if t.trim().is_empty()) {
                end += 1;
            }
            self.layout.drain(pos..end);
        }
        for segment in &mut self.layout {
            if let Segment::Entry(j) = segment {
                if *j > i {
                    *j -= 1;
                }
            }
        }
        self.reindex();
        Ok(removed)
    }

    /// Define or redefine a macro
    pub fn set_macro(&mut self, name: &str, value: impl Into<FieldValue>) -> Result<(), ModelError> {
        if !parser::is_valid_name(name) {
            return Err(ModelError::InvalidName(name.to_string()));
        }
        let value = value.into();
        check_writable(name, &value)?;
        match self.macro_index.get(&name.to_lowercase()) {
            Some(&i) => self.macros[i].set_value(value),
            None => {
                let i = self.macros.len();
                self.macros.push(MacroDefinition::new(name, value));
                self.insert_macro_segment(i);
            }
        }
        self.reindex();
        Ok(())
    }

    /// Append all entries and macros of another bibliography
    ///
    /// Unlike [`Bibliography::add_entry`] this does not reject colliding keys;
    /// such collisions are what the duplicate-key check reports. A macro
    /// already defined here keeps its definition.
    pub fn merge(&mut self, other: Bibliography) {
        for definition in other.macros {
            match self.macro_definition(definition.name()) {
                Some(existing) => {
                    if existing.value() != definition.value() {
                        warn!(
                            "merge keeps @string '{}' = {}, dropping {}",
                            existing.name(),
                            existing.value(),
                            definition.value()
                        );
                    }
                }
                None => {
                    let i = self.macros.len();
                    self.macros.push(definition);
                    self.insert_macro_segment(i);
                }
            }
        }
        for entry in other.entries {
            self.push_entry(entry);
        }
        self.comments.extend(other.comments);
        self.reindex();
    }

    /// Regenerate every entry and macro definition in canonical form
    ///
    /// Comments, the preamble and the text between blocks are kept as they are.
    pub fn reformat(&mut self) {
        for entry in &mut self.entries {
            entry.clear_verbatim();
        }
        for definition in &mut self.macros {
            definition.clear_verbatim();
        }
    }

    /// Serialize back to BibTeX text
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for segment in &self.layout {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Entry(i) => {
                    let entry = &self.entries[*i];
                    match entry.verbatim() {
                        Some(text) => out.push_str(text),
                        None => out.push_str(&format_entry(entry)),
                    }
                }
                Segment::Macro(i) => {
                    let definition = &self.macros[*i];
                    match definition.verbatim() {
                        Some(text) => out.push_str(text),
                        None => out.push_str(&format_macro_definition(definition)),
                    }
                }
            }
        }
        normalize_trailing_whitespace(&out)
    }
}
