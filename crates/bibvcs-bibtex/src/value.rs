//! Raw BibTeX field values
//!
//! A field value is a `#`-concatenation of parts. Each part keeps the
//! delimiter it was written with so that regenerated text stays faithful.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::parser::is_valid_name;

/// One `#`-separated piece of a field value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum ValuePart {
    /// `{...}`, stored without the outer braces
    Braced(String),
    /// `"..."`, stored without the quotes
    Quoted(String),
    /// A bare run of digits
    Number(String),
    /// A bare macro name, stored lowercase
    MacroRef(String),
}

impl ValuePart {
    /// Literal text of this part, or `None` for a macro reference
    pub fn literal(&self) -> Option<&str> {
        match self {
            Self::Braced(text) | Self::Quoted(text) | Self::Number(text) => Some(text),
            Self::MacroRef(_) => None,
        }
    }

    /// The macro name if this part is a reference
    pub fn macro_name(&self) -> Option<&str> {
        match self {
            Self::MacroRef(name) => Some(name),
            _ => None,
        }
    }

    /// Whether the written form of this part parses back to the same part
    pub fn is_writable(&self) -> bool {
        match self {
            Self::Braced(text) => braces_balanced(text),
            Self::Quoted(text) => braces_balanced(text) && !has_top_level_quote(text),
            Self::Number(digits) => {
                !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
            }
            Self::MacroRef(name) => is_valid_name(name),
        }
    }
}

/// Every `}` closes an earlier `{` and every `{` is closed
pub fn braces_balanced(text: &str) -> bool {
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            '{' => depth += 1,
            '}' => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return false,
            },
            _ => {}
        }
    }
    depth == 0
}

fn has_top_level_quote(text: &str) -> bool {
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            '"' if depth == 0 => return true,
            _ => {}
        }
    }
    false
}

impl fmt::Display for ValuePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Braced(text) => write!(f, "{{{text}}}"),
            Self::Quoted(text) => write!(f, "\"{text}\""),
            Self::Number(text) | Self::MacroRef(text) => f.write_str(text),
        }
    }
}

/// A complete field value: one or more parts joined with `#`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FieldValue {
    parts: Vec<ValuePart>,
}

impl FieldValue {
    pub fn new(parts: Vec<ValuePart>) -> Self {
        Self { parts }
    }

    /// A single braced literal
    pub fn braced(text: impl Into<String>) -> Self {
        Self::new(vec![ValuePart::Braced(text.into())])
    }

    /// A single quoted literal
    pub fn quoted(text: impl Into<String>) -> Self {
        Self::new(vec![ValuePart::Quoted(text.into())])
    }

    pub fn number(digits: impl Into<String>) -> Self {
        Self::new(vec![ValuePart::Number(digits.into())])
    }

    /// A single macro reference; the name is case-folded
    pub fn macro_ref(name: &str) -> Self {
        Self::new(vec![ValuePart::MacroRef(name.to_lowercase())])
    }

    pub fn parts(&self) -> &[ValuePart] {
        &self.parts
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Append another value's parts, as `a # b` would
    pub fn concat(&mut self, other: FieldValue) {
        self.parts.extend(other.parts);
    }

    /// Names of all macros referenced directly by this value
    pub fn macro_refs(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(ValuePart::macro_name)
    }

    /// The macro name when the value is exactly one reference
    pub fn as_macro_ref(&self) -> Option<&str> {
        match self.parts.as_slice() {
            [ValuePart::MacroRef(name)] => Some(name),
            _ => None,
        }
    }

    /// First part whose written form would not parse back unchanged
    pub fn unwritable_part(&self) -> Option<&ValuePart> {
        self.parts.iter().find(|part| !part.is_writable())
    }

    /// Concatenated literal text, or `None` if any part is a macro reference
    pub fn literal(&self) -> Option<String> {
        self.parts
            .iter()
            .map(ValuePart::literal)
            .collect::<Option<Vec<_>>>()
            .map(|pieces| pieces.concat())
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                f.write_str(" # ")?;
            }
            write!(f, "{part}")?;
        }
        Ok(())
    }
}

impl From<&str> for FieldValue {
    fn from(text: &str) -> Self {
        Self::braced(text)
    }
}

impl From<String> for FieldValue {
    fn from(text: String) -> Self {
        Self::braced(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_keeps_delimiters() {
        let value = FieldValue::new(vec![
            ValuePart::MacroRef("jan".into()),
            ValuePart::Quoted(" / ".into()),
            ValuePart::Braced("{F}eb".into()),
            ValuePart::Number("12".into()),
        ]);
        assert_eq!(value.to_string(), r#"jan # " / " # {{F}eb} # 12"#);
    }

    #[test]
    fn test_literal_requires_no_macros() {
        assert_eq!(FieldValue::braced("abc").literal().as_deref(), Some("abc"));
        let mixed = FieldValue::new(vec![
            ValuePart::Quoted("a".into()),
            ValuePart::MacroRef("b".into()),
        ]);
        assert_eq!(mixed.literal(), None);
        assert_eq!(mixed.macro_refs().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn test_single_macro_ref() {
        assert_eq!(FieldValue::macro_ref("JCSS").as_macro_ref(), Some("jcss"));
        assert_eq!(FieldValue::number("2020").as_macro_ref(), None);
    }

    #[test]
    fn test_writable_parts() {
        assert!(FieldValue::braced("{B}alanced").unwritable_part().is_none());
        assert!(FieldValue::quoted("a {\"} b").unwritable_part().is_none());
        assert_eq!(
            FieldValue::braced("open {").unwritable_part(),
            Some(&ValuePart::Braced("open {".into()))
        );
        assert!(!ValuePart::Braced("} {".into()).is_writable());
        assert!(!ValuePart::Quoted("a \" b".into()).is_writable());
        assert!(!ValuePart::Number("".into()).is_writable());
        assert!(!ValuePart::MacroRef("has space".into()).is_writable());
    }
}
