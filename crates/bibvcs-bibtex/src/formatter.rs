//! BibTeX formatting module
//!
//! Regenerates BibTeX text for entries and macros that no longer have
//! verbatim source text, and for generated macro files.

use crate::entry::{Entry, MacroDefinition};
use crate::value::FieldValue;

/// Format a single BibTeX entry to string
pub fn format_entry(entry: &Entry) -> String {
    let mut result = String::new();

    // Entry type and cite key
    result.push('@');
    result.push_str(entry.entry_type());
    result.push('{');
    result.push_str(entry.key());
    result.push(',');
    result.push('\n');

    // Fields
    for field in entry.fields() {
        result.push_str("    ");
        result.push_str(&field.name);
        result.push_str(" = ");
        result.push_str(&format_value(&field.value));
        result.push(',');
        result.push('\n');
    }

    result.push('}');
    result
}

/// Format a field value with the delimiters each part was written with
pub fn format_value(value: &FieldValue) -> String {
    value.to_string()
}

/// Format a @string definition
pub fn format_macro_definition(definition: &MacroDefinition) -> String {
    format!(
        "@string{{{} = {}}}",
        definition.name(),
        format_value(definition.value())
    )
}

/// Format a @preamble
pub fn format_preamble(value: &FieldValue) -> String {
    format!("@preamble{{{}}}", format_value(value))
}

/// Format a @string line for a plain text value, as used in generated macro files
///
/// Quotes are used unless the text contains a `"` outside of braces, which
/// only a braced literal can carry.
pub fn format_string_literal(name: &str, text: &str) -> String {
    if needs_braces(text) {
        format!("@string{{{name} = {{{text}}}}}")
    } else {
        format!("@string{{{name} = \"{text}\"}}")
    }
}

fn needs_braces(text: &str) -> bool {
    let mut depth = 0i32;
    for c in text.chars() {
        match c {
            '{' => depth += 1,
            '}' => depth -= 1,
            '"' if depth == 0 => return true,
            _ => {}
        }
    }
    false
}

/// Strip insignificant trailing whitespace; non-empty text ends in one newline
pub fn normalize_trailing_whitespace(text: &str) -> String {
    let trimmed = text.trim_end();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}\n")
    }
}

/// Human-readable form of a resolved value: grouping braces removed
pub fn strip_grouping(text: &str) -> String {
    text.chars().filter(|&c| c != '{' && c != '}').collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValuePart;

    #[test]
    fn test_format_simple_entry() {
        let entry = Entry::new("article", "Smith2024")
            .with_field("author", "John Smith")
            .with_field("title", "A Great Paper")
            .with_field("year", FieldValue::number("2024"))
            .with_field("journal", FieldValue::macro_ref("JCSS"));

        let formatted = format_entry(&entry);
        assert!(formatted.starts_with("@article{Smith2024,\n"));
        assert!(formatted.contains("    author = {John Smith},\n"));
        assert!(formatted.contains("    title = {A Great Paper},\n"));
        // Numbers and macros are written bare
        assert!(formatted.contains("    year = 2024,\n"));
        assert!(formatted.contains("    journal = jcss,\n"));
        assert!(formatted.ends_with('}'));
    }

    #[test]
    fn test_format_concatenation() {
        let value = FieldValue::new(vec![
            ValuePart::MacroRef("jan".into()),
            ValuePart::Quoted("/".into()),
            ValuePart::MacroRef("feb".into()),
        ]);
        assert_eq!(format_value(&value), r#"jan # "/" # feb"#);
    }

    #[test]
    fn test_format_string_literal() {
        assert_eq!(
            format_string_literal("JCSS", "Journal of Computer and System Sciences"),
            r#"@string{JCSS = "Journal of Computer and System Sciences"}"#
        );
        assert_eq!(
            format_string_literal("Q", r#"The "Quoted" Journal"#),
            r#"@string{Q = {The "Quoted" Journal}}"#
        );
        assert_eq!(
            format_string_literal("B", r#"{"}Braced"#),
            r#"@string{B = "{"}Braced"}"#
        );
    }

    #[test]
    fn test_normalize_trailing_whitespace() {
        assert_eq!(normalize_trailing_whitespace("a\n\n  \n"), "a\n");
        assert_eq!(normalize_trailing_whitespace("a"), "a\n");
        assert_eq!(normalize_trailing_whitespace(" \n"), "");
    }

    #[test]
    fn test_strip_grouping() {
        assert_eq!(strip_grouping("{IEEE} Trans. {I}nf."), "IEEE Trans. Inf.");
    }
}
