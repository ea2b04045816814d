//! BibTeX parsing, modelling and journal macros
//!
//! This crate reads a `.bib` file into a model that can be queried, changed
//! and written back. Unmodified entries are written from their original
//! text, so a parse/serialize round trip reproduces the file.
//!
//! Features:
//! - Nom-based parser with line/column errors and duplicate-key detection
//! - Macro resolution against `@string` definitions, months and extra sources,
//!   with cycle detection
//! - Cross-reference lookup and JabRef `file` field decoding
//! - Journal macro registry generating full and abbreviated `@string` files

mod entry;
mod formatter;
mod journal_macros;
mod model;
pub mod parser;
mod resolve;
mod value;

pub use entry::{Entry, Field, FileFieldError, MacroDefinition, Span};
pub use formatter::{
    format_entry, format_macro_definition, format_string_literal, format_value,
    normalize_trailing_whitespace, strip_grouping,
};
pub use journal_macros::{
    ConfigErrorKind, ConfigFormatError, Journal, JournalError, JournalMacros, JournalRegistry,
    JournalStyle,
};
pub use model::{Bibliography, MacroReference, ModelError};
pub use parser::{
    is_valid_name, parse, parse_entry, DuplicateKeyError, ParseError, ParsedBibliography,
    Position, SyntaxError,
};
pub use resolve::{is_month_macro, MacroIssue, MacroSource, ResolvedValue, Resolver};
pub use value::{braces_balanced, FieldValue, ValuePart};
