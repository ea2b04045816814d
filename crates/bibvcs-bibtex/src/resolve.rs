//! Macro substitution
//!
//! Field values are resolved against the bibliography's own `@string`
//! definitions, then any additional [`MacroSource`]s (such as the journal
//! registry), then the builtin month macros. Resolution never fails: unknown
//! and cyclic references are reported as [`MacroIssue`]s next to a
//! best-effort text in which the macro name stands in for its value.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;

use crate::model::Bibliography;
use crate::value::{FieldValue, ValuePart};

lazy_static! {
    /// Month macros every BibTeX style predefines
    static ref MONTHS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("jan", "January");
        m.insert("feb", "February");
        m.insert("mar", "March");
        m.insert("apr", "April");
        m.insert("may", "May");
        m.insert("jun", "June");
        m.insert("jul", "July");
        m.insert("aug", "August");
        m.insert("sep", "September");
        m.insert("oct", "October");
        m.insert("nov", "November");
        m.insert("dec", "December");
        m
    };
}

/// Check if a macro name is one of the builtin month macros
pub fn is_month_macro(name: &str) -> bool {
    MONTHS.contains_key(name.to_lowercase().as_str())
}

/// Anything that can supply terminal macro values by name
pub trait MacroSource {
    /// Value of the macro, or `None` if this source does not define it.
    /// Names are passed lowercase.
    fn macro_text(&self, name: &str) -> Option<Cow<'_, str>>;
}

/// A problem found while substituting macros
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MacroIssue {
    /// The macro is not declared anywhere
    Undefined { name: String },
    /// The macro's definition refers back to itself; `chain` starts and ends with `name`
    Cyclic { name: String, chain: Vec<String> },
}

impl MacroIssue {
    pub fn name(&self) -> &str {
        match self {
            Self::Undefined { name } | Self::Cyclic { name, .. } => name,
        }
    }
}

impl fmt::Display for MacroIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined { name } => write!(f, "undefined macro '{name}'"),
            Self::Cyclic { name, chain } => {
                write!(f, "cyclic macro '{name}' ({})", chain.join(" -> "))
            }
        }
    }
}

/// Outcome of resolving a value
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvedValue {
    /// Substituted text; unresolved macros appear as their names
    pub text: String,
    pub issues: Vec<MacroIssue>,
}

impl ResolvedValue {
    pub fn is_resolved(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Resolves macro references against a bibliography plus extra sources
pub struct Resolver<'a> {
    bibliography: &'a Bibliography,
    sources: Vec<&'a dyn MacroSource>,
}

impl<'a> Resolver<'a> {
    pub fn new(bibliography: &'a Bibliography) -> Self {
        Self {
            bibliography,
            sources: Vec::new(),
        }
    }

    /// Add a fallback source consulted after the bibliography's own macros
    pub fn with_source(mut self, source: &'a dyn MacroSource) -> Self {
        self.sources.push(source);
        self
    }

    /// Whether `name` is declared by the bibliography, a source, or the builtins
    pub fn is_declared(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.bibliography.macro_definition(&name).is_some()
            || self.sources.iter().any(|s| s.macro_text(&name).is_some())
            || MONTHS.contains_key(name.as_str())
    }

    pub fn resolve(&self, value: &FieldValue) -> ResolvedValue {
        let mut resolved = ResolvedValue::default();
        let mut stack = Vec::new();
        self.expand(value, &mut stack, &mut resolved);
        resolved
    }

    /// Resolve a macro by name, as if a field consisted of that single reference
    pub fn resolve_macro(&self, name: &str) -> ResolvedValue {
        self.resolve(&FieldValue::macro_ref(name))
    }

    fn expand(&self, value: &FieldValue, stack: &mut Vec<String>, out: &mut ResolvedValue) {
        for part in value.parts() {
            match part {
                ValuePart::MacroRef(name) => self.expand_macro(name, stack, out),
                literal => {
                    if let Some(text) = literal.literal() {
                        out.text.push_str(text);
                    }
                }
            }
        }
    }

    fn expand_macro(&self, name: &str, stack: &mut Vec<String>, out: &mut ResolvedValue) {
        if let Some(pos) = stack.iter().position(|seen| seen == name) {
            let mut chain: Vec<String> = stack[pos..].to_vec();
            chain.push(name.to_string());
            push_issue(
                out,
                MacroIssue::Cyclic {
                    name: name.to_string(),
                    chain,
                },
            );
            out.text.push_str(name);
            return;
        }

        if let Some(definition) = self.bibliography.macro_definition(name) {
            stack.push(name.to_string());
            self.expand(definition.value(), stack, out);
            stack.pop();
            return;
        }

        if let Some(text) = self.sources.iter().find_map(|s| s.macro_text(name)) {
            out.text.push_str(&text);
            return;
        }

        match MONTHS.get(name) {
            Some(month) => out.text.push_str(month),
            None => {
                push_issue(
                    out,
                    MacroIssue::Undefined {
                        name: name.to_string(),
                    },
                );
                out.text.push_str(name);
            }
        }
    }
}

fn push_issue(out: &mut ResolvedValue, issue: MacroIssue) {
    if !out.issues.contains(&issue) {
        out.issues.push(issue);
    }
}

impl MacroSource for HashMap<String, String> {
    fn macro_text(&self, name: &str) -> Option<Cow<'_, str>> {
        self.get(name).map(|text| Cow::Borrowed(text.as_str()))
    }
}
