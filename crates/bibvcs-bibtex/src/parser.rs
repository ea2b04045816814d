//! BibTeX parser implementation using nom
//!
//! This parser handles the BibTeX format as btparse understands it:
//! - @string definitions
//! - @preamble declarations
//! - @comment sections and implicit comments between blocks
//! - Entries delimited by braces or parentheses
//! - Braced, quoted, numeric and macro field values
//! - String concatenation with #
//! - Nested braces in field values
//!
//! Every top-level block keeps its exact source range, so the concatenation
//! of all blocks reproduces the input byte for byte.

use std::collections::HashMap;
use std::sync::Arc;

use nom::{
    bytes::complete::{take_while, take_while1},
    character::complete::{char, multispace0},
    error::ErrorKind,
    IResult,
};

use crate::entry::{Entry, Field, MacroDefinition, Span, Verbatim};
use crate::value::{FieldValue, ValuePart};

/// Location in the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    /// 1-based line
    pub line: u32,
    /// 1-based column, counted in characters
    pub column: u32,
    /// Byte offset
    pub offset: usize,
}

impl Position {
    /// Compute line and column of a byte offset
    pub fn locate(source: &str, offset: usize) -> Self {
        let offset = offset.min(source.len());
        let before = &source[..offset];
        let line = before.matches('\n').count() as u32 + 1;
        let line_start = before.rfind('\n').map_or(0, |pos| pos + 1);
        let column = before[line_start..].chars().count() as u32 + 1;
        Self {
            line,
            column,
            offset,
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Malformed BibTeX syntax
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{position}: {message}")]
pub struct SyntaxError {
    pub position: Position,
    pub message: String,
}

/// Two entries with the same citation key in one parse
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{position}: duplicate citation key '{key}' (first defined at {first})")]
pub struct DuplicateKeyError {
    pub key: String,
    pub position: Position,
    pub first: Position,
}

/// Error type for parsing failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("syntax error at {0}")]
    Syntax(#[from] SyntaxError),
    #[error("{0}")]
    DuplicateKey(#[from] DuplicateKeyError),
}

impl ParseError {
    pub fn position(&self) -> Position {
        match self {
            Self::Syntax(err) => err.position,
            Self::DuplicateKey(err) => err.position,
        }
    }

    /// What went wrong, without the position
    pub fn description(&self) -> String {
        match self {
            Self::Syntax(err) => err.message.clone(),
            Self::DuplicateKey(err) => format!(
                "duplicate citation key '{}' (first defined at {})",
                err.key, err.first
            ),
        }
    }
}

/// A `@preamble` block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preamble {
    pub value: FieldValue,
    pub verbatim: Verbatim,
}

/// A `@comment` block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub text: String,
    pub verbatim: Verbatim,
}

/// One top-level element of a bib file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Entry(Entry),
    Macro(MacroDefinition),
    Preamble(Preamble),
    Comment(Comment),
    /// Text between blocks (implicit comment, whitespace)
    Text(Verbatim),
}

impl Block {
    /// Source text of the block
    pub fn verbatim(&self) -> &str {
        match self {
            Self::Entry(entry) => entry.verbatim().unwrap_or_default(),
            Self::Macro(definition) => definition.verbatim().unwrap_or_default(),
            Self::Preamble(preamble) => preamble.verbatim.as_str(),
            Self::Comment(comment) => comment.verbatim.as_str(),
            Self::Text(text) => text.as_str(),
        }
    }
}

/// Result of parsing a bib file
#[derive(Debug, Clone)]
pub struct ParsedBibliography {
    source: Arc<str>,
    blocks: Vec<Block>,
}

impl ParsedBibliography {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }

    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.blocks.iter().filter_map(|block| match block {
            Block::Entry(entry) => Some(entry),
            _ => None,
        })
    }

    pub fn macros(&self) -> impl Iterator<Item = &MacroDefinition> {
        self.blocks.iter().filter_map(|block| match block {
            Block::Macro(definition) => Some(definition),
            _ => None,
        })
    }

    /// All `@preamble` values concatenated in file order
    pub fn preamble(&self) -> Option<FieldValue> {
        let mut preamble: Option<FieldValue> = None;
        for block in &self.blocks {
            if let Block::Preamble(p) = block {
                match preamble.as_mut() {
                    Some(value) => value.concat(p.value.clone()),
                    None => preamble = Some(p.value.clone()),
                }
            }
        }
        preamble
    }

    /// Bodies of `@comment` blocks
    pub fn comments(&self) -> impl Iterator<Item = &str> {
        self.blocks.iter().filter_map(|block| match block {
            Block::Comment(comment) => Some(comment.text.as_str()),
            _ => None,
        })
    }
}

/// Parse a BibTeX string
pub fn parse(input: &str) -> Result<ParsedBibliography, ParseError> {
    let source: Arc<str> = Arc::from(input);
    let mut blocks = Vec::new();
    let mut first_seen: HashMap<String, usize> = HashMap::new();
    let mut offset = 0;

    while offset < input.len() {
        let rest = &input[offset..];
        let text_len = implicit_comment_len(rest);
        if text_len > 0 {
            let span = Span::new(offset, offset + text_len);
            blocks.push(Block::Text(Verbatim::new(source.clone(), span)));
            offset += text_len;
            continue;
        }

        let (remaining, raw) = match at_block(rest) {
            Ok(parsed) => parsed,
            Err(nom::Err::Error(fault)) | Err(nom::Err::Failure(fault)) => {
                return Err(fault.into_syntax_error(input).into());
            }
            Err(nom::Err::Incomplete(_)) => {
                return Err(SyntaxError {
                    position: Position::locate(input, input.len()),
                    message: "unexpected end of input".to_string(),
                }
                .into());
            }
        };
        let span = Span::new(offset, input.len() - remaining.len());
        let verbatim = Verbatim::new(source.clone(), span);

        let block = match raw {
            RawBlock::Entry {
                entry_type,
                key,
                fields,
            } => {
                if let Some(&first) = first_seen.get(key) {
                    return Err(DuplicateKeyError {
                        key: key.to_string(),
                        position: Position::locate(input, offset),
                        first: Position::locate(input, first),
                    }
                    .into());
                }
                first_seen.insert(key.to_string(), offset);
                Block::Entry(Entry::parsed(
                    entry_type.to_lowercase(),
                    key.to_string(),
                    fields,
                    verbatim,
                ))
            }
            RawBlock::Macro { name, value } => {
                Block::Macro(MacroDefinition::parsed(name.to_lowercase(), value, verbatim))
            }
            RawBlock::Preamble(value) => Block::Preamble(Preamble { value, verbatim }),
            RawBlock::Comment(text) => Block::Comment(Comment {
                text: text.to_string(),
                verbatim,
            }),
        };
        blocks.push(block);
        offset = span.end;
    }

    Ok(ParsedBibliography { source, blocks })
}

/// Parse a single BibTeX entry
pub fn parse_entry(input: &str) -> Result<Entry, ParseError> {
    let parsed = parse(input)?;
    let first = parsed.entries().next().cloned();
    first.ok_or_else(|| {
        SyntaxError {
            position: Position::locate(input, input.len()),
            message: "no entry found".to_string(),
        }
        .into()
    })
}

type PResult<'a, T> = IResult<&'a str, T, Fault<'a>>;

/// Internal error carrying the unparsed remainder at the failure point
#[derive(Debug)]
struct Fault<'a> {
    input: &'a str,
    message: String,
}

impl<'a> Fault<'a> {
    fn into_syntax_error(self, source: &str) -> SyntaxError {
        SyntaxError {
            position: Position::locate(source, source.len() - self.input.len()),
            message: self.message,
        }
    }
}

impl<'a> nom::error::ParseError<&'a str> for Fault<'a> {
    fn from_error_kind(input: &'a str, kind: ErrorKind) -> Self {
        Self {
            input,
            message: format!("unexpected input ({})", kind.description()),
        }
    }

    fn append(_input: &'a str, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

fn fail<'a, T>(input: &'a str, message: impl Into<String>) -> PResult<'a, T> {
    Err(nom::Err::Failure(Fault {
        input,
        message: message.into(),
    }))
}

/// A block before it is bound to the shared source buffer
enum RawBlock<'a> {
    Entry {
        entry_type: &'a str,
        key: &'a str,
        fields: Vec<Field>,
    },
    Macro {
        name: &'a str,
        value: FieldValue,
    },
    Preamble(FieldValue),
    Comment(&'a str),
}

/// Length of the text before the next `@` that starts a block
///
/// Lines whose first non-blank character is `%` are skipped entirely.
fn implicit_comment_len(input: &str) -> usize {
    let bytes = input.as_bytes();
    let mut pos = 0;
    let mut line_blank = true;
    while pos < bytes.len() {
        match bytes[pos] {
            b'@' => return pos,
            b'%' if line_blank => {
                while pos < bytes.len() && bytes[pos] != b'\n' {
                    pos += 1;
                }
                continue;
            }
            b'\n' => line_blank = true,
            b if b.is_ascii_whitespace() => {}
            _ => line_blank = false,
        }
        pos += 1;
    }
    bytes.len()
}

/// Characters that may not appear in names or keys (besides whitespace)
const FORBIDDEN: &str = "\"#%'(),={}";

fn is_key_char(c: char) -> bool {
    !c.is_whitespace() && !FORBIDDEN.contains(c)
}

fn is_name_start(c: char) -> bool {
    is_key_char(c) && !c.is_ascii_digit()
}

/// Whether `name` is usable as a macro, field or entry type name
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if is_name_start(c)) && chars.all(is_key_char)
}

fn ws(input: &str) -> PResult<'_, &str> {
    multispace0(input)
}

/// A type, field or macro name (cannot start with a digit)
fn name<'a>(input: &'a str, what: &str) -> PResult<'a, &'a str> {
    match input.chars().next() {
        Some(c) if is_name_start(c) => take_while1(is_key_char)(input),
        _ => fail(input, format!("expected {what}")),
    }
}

/// Parse an @ block (entry, string, preamble, or comment)
fn at_block<'a>(input: &'a str) -> PResult<'a, RawBlock<'a>> {
    let (rest, _) = char::<_, Fault<'a>>('@')(input)?;
    let (rest, _) = ws(rest)?;
    let (rest, kind) = name(rest, "entry type after '@'")?;

    match kind.to_lowercase().as_str() {
        "comment" => {
            let (rest, text) = comment_body(rest)?;
            Ok((rest, RawBlock::Comment(text)))
        }
        "preamble" => {
            let (rest, closing) = open_delimiter(rest)?;
            let (rest, _) = ws(rest)?;
            let (rest, value) = field_value(rest)?;
            let (rest, _) = close_delimiter(rest, closing)?;
            Ok((rest, RawBlock::Preamble(value)))
        }
        "string" => {
            let (rest, closing) = open_delimiter(rest)?;
            let (rest, _) = ws(rest)?;
            let (rest, macro_name) = name(rest, "macro name")?;
            let (rest, _) = ws(rest)?;
            let (rest, _) = expect(rest, '=', "'=' after macro name")?;
            let (rest, _) = ws(rest)?;
            let (rest, value) = field_value(rest)?;
            let (rest, _) = close_delimiter(rest, closing)?;
            Ok((
                rest,
                RawBlock::Macro {
                    name: macro_name,
                    value,
                },
            ))
        }
        _ => entry_body(rest, kind),
    }
}

fn expect<'a>(input: &'a str, c: char, what: &str) -> PResult<'a, char> {
    match char::<&str, Fault<'a>>(c)(input) {
        Ok(parsed) => Ok(parsed),
        Err(_) => fail(input, format!("expected {what}")),
    }
}

/// Opening `{` or `(`; returns the matching closing delimiter
fn open_delimiter(input: &str) -> PResult<'_, char> {
    let (rest, _) = ws(input)?;
    match rest.chars().next() {
        Some('{') => Ok((&rest[1..], '}')),
        Some('(') => Ok((&rest[1..], ')')),
        _ => fail(rest, "expected '{' or '('"),
    }
}

fn close_delimiter(input: &str, closing: char) -> PResult<'_, ()> {
    let (rest, _) = ws(input)?;
    let (rest, _) = expect(rest, closing, &format!("'{closing}'"))?;
    Ok((rest, ()))
}

/// A @comment body: braced content, or the rest of the line
fn comment_body<'a>(input: &'a str) -> PResult<'a, &'a str> {
    let (rest, _) = take_while::<_, _, Fault<'a>>(|c: char| c == ' ' || c == '\t')(input)?;
    match rest.chars().next() {
        Some('{') => {
            let (rest, inner) = braced_content(rest)?;
            Ok((rest, inner))
        }
        Some('(') => {
            let end = matching_paren(rest).ok_or_else(|| {
                nom::Err::Failure(Fault {
                    input: rest,
                    message: "unbalanced parentheses: '(' is never closed".to_string(),
                })
            })?;
            Ok((&rest[end + 1..], &rest[1..end]))
        }
        _ => {
            let end = rest.find('\n').unwrap_or(rest.len());
            Ok((&rest[end..], &rest[..end]))
        }
    }
}

fn matching_paren(input: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (pos, c) in input.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(pos);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse an entry body: `{key, name = value, ...}`
fn entry_body<'a>(input: &'a str, entry_type: &'a str) -> PResult<'a, RawBlock<'a>> {
    let (rest, closing) = open_delimiter(input)?;
    let (rest, _) = ws(rest)?;
    let (rest, key) = match take_while1::<_, &str, Fault<'a>>(is_key_char)(rest) {
        Ok(parsed) => parsed,
        Err(_) => return fail(rest, "missing citation key"),
    };
    let (rest, _) = ws(rest)?;

    if let Some(rest) = rest.strip_prefix(closing) {
        return Ok((
            rest,
            RawBlock::Entry {
                entry_type,
                key,
                fields: Vec::new(),
            },
        ));
    }
    let (mut remaining, _) = expect(rest, ',', "',' after citation key")?;

    let mut fields: Vec<Field> = Vec::new();
    loop {
        let (rest, _) = ws(remaining)?;
        if let Some(rest) = rest.strip_prefix(closing) {
            return Ok((
                rest,
                RawBlock::Entry {
                    entry_type,
                    key,
                    fields,
                },
            ));
        }

        let field_start = rest;
        let (rest, field_name) = name(rest, "field name")?;
        let field_name = field_name.to_lowercase();
        if fields.iter().any(|f| f.name == field_name) {
            return fail(
                field_start,
                format!("duplicate field '{field_name}' in entry '{key}'"),
            );
        }
        let (rest, _) = ws(rest)?;
        let (rest, _) = expect(rest, '=', &format!("'=' after field name '{field_name}'"))?;
        let (rest, _) = ws(rest)?;
        let (rest, value) = field_value(rest)?;
        fields.push(Field {
            name: field_name,
            value,
        });

        let (rest, _) = ws(rest)?;
        if let Some(rest) = rest.strip_prefix(',') {
            remaining = rest;
        } else if rest.starts_with(closing) {
            remaining = rest;
        } else {
            return fail(rest, format!("expected ',' or '{closing}' after field value"));
        }
    }
}

/// Parse a field value: parts joined with `#`
fn field_value(input: &str) -> PResult<'_, FieldValue> {
    let mut parts = Vec::new();
    let mut remaining = input;

    loop {
        let (rest, part) = value_part(remaining)?;
        parts.push(part);

        // Check for concatenation
        let (after_ws, _) = ws(rest)?;
        match after_ws.strip_prefix('#') {
            Some(stripped) => {
                let (stripped, _) = ws(stripped)?;
                remaining = stripped;
            }
            None => return Ok((rest, FieldValue::new(parts))),
        }
    }
}

fn value_part<'a>(input: &'a str) -> PResult<'a, ValuePart> {
    match input.chars().next() {
        Some('{') => {
            let (rest, inner) = braced_content(input)?;
            Ok((rest, ValuePart::Braced(inner.to_string())))
        }
        Some('"') => {
            let (rest, inner) = quoted_content(input)?;
            Ok((rest, ValuePart::Quoted(inner.to_string())))
        }
        Some(c) if c.is_ascii_digit() => {
            let (rest, digits) =
                take_while1::<_, _, Fault<'a>>(|c: char| c.is_ascii_digit())(input)?;
            Ok((rest, ValuePart::Number(digits.to_string())))
        }
        Some(c) if is_name_start(c) => {
            let (rest, macro_name) = take_while1::<_, _, Fault<'a>>(is_key_char)(input)?;
            Ok((rest, ValuePart::MacroRef(macro_name.to_lowercase())))
        }
        _ => fail(input, "expected field value"),
    }
}

/// Braced content including nested braces; returns the text inside the outer pair
fn braced_content(input: &str) -> PResult<'_, &str> {
    let (_, _) = expect(input, '{', "'{'")?;
    let mut depth = 0usize;
    for (pos, c) in input.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&input[pos + 1..], &input[1..pos]));
                }
            }
            _ => {}
        }
    }
    fail(input, "unbalanced braces: '{' is never closed")
}

/// Quoted content; quotes inside braces do not terminate the value
fn quoted_content(input: &str) -> PResult<'_, &str> {
    let (_, _) = expect(input, '"', "'\"'")?;
    let mut depth = 0usize;
    for (pos, c) in input.char_indices().skip(1) {
        match c {
            '"' if depth == 0 => return Ok((&input[pos + 1..], &input[1..pos])),
            '{' => depth += 1,
            '}' if depth == 0 => {
                return fail(&input[pos..], "unbalanced braces: unexpected '}' in quoted value")
            }
            '}' => depth -= 1,
            _ => {}
        }
    }
    if depth > 0 {
        fail(input, "unbalanced braces in quoted value")
    } else {
        fail(input, "unterminated quoted value")
    }
}
