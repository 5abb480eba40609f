//! Declaration block tokenizer
//!
//! Splits `prop: value; prop: value` text (the inside of a `{}` block or an
//! inline `style` attribute) into ordered [`Declaration`]s. The scanner is an
//! explicit state machine over the bytes of the block: every structural
//! character (`:` `;` quotes, parens, backslash) is ASCII, so byte positions
//! are always valid UTF-8 boundaries for slicing.

use std::fmt;

/// A single `property: value` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    /// Lower-cased, trimmed property name
    pub property: String,
    /// Trimmed value with the original case preserved
    pub value: String,
}

impl Declaration {
    /// Create a declaration from its parts
    pub fn new(property: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.property, self.value)
    }
}

/// Scanner state while removing comments and line breaks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Normal,
    SingleQuote,
    DoubleQuote,
    Comment,
}

/// Parse a declaration block into its declarations, in document order.
///
/// Malformed input never fails the block: dangling quotes and parens extend
/// the value to the end of the input, declarations without a value or with a
/// name that is not a property identifier are skipped.
pub fn parse_css_block(style: &str) -> Vec<Declaration> {
    let clean = strip_comments_and_newlines(style);
    let bytes = clean.as_bytes();
    let mut result = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let stop = scan_property_name(bytes, pos);
        if stop >= bytes.len() {
            break;
        }
        if bytes[stop] == b';' {
            pos = stop + 1;
            continue;
        }

        let value_end = scan_value(bytes, stop + 1);
        let property = clean[pos..stop].trim().to_ascii_lowercase();
        let value = clean[stop + 1..value_end].trim();

        if is_property_name(&property) && !value.is_empty() {
            result.push(Declaration::new(property, value));
        }

        pos = value_end + 1;
    }

    result
}

/// Render declarations as a block body: `{ a: b; c: d; }` or `{}`.
pub fn format_block(declarations: &[Declaration]) -> String {
    if declarations.is_empty() {
        return "{}".to_string();
    }

    let body = declarations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    format!("{{ {}; }}", body)
}

/// Remove `/* */` comments outside strings and fold line breaks into spaces.
fn strip_comments_and_newlines(style: &str) -> String {
    let mut out = String::with_capacity(style.len());
    let mut state = ScanState::Normal;
    let mut chars = style.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            ScanState::Comment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = ScanState::Normal;
                }
                continue;
            }
            ScanState::Normal if c == '/' && chars.peek() == Some(&'*') => {
                chars.next();
                state = ScanState::Comment;
                continue;
            }
            _ => {}
        }

        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push(' ');
            }
            '\n' | '\x0c' => out.push(' '),
            '\\' => {
                out.push(c);
                if let Some(next) = chars.next() {
                    out.push(if matches!(next, '\r' | '\n' | '\x0c') { ' ' } else { next });
                }
            }
            '\'' => {
                state = match state {
                    ScanState::Normal => ScanState::SingleQuote,
                    ScanState::SingleQuote => ScanState::Normal,
                    other => other,
                };
                out.push(c);
            }
            '"' => {
                state = match state {
                    ScanState::Normal => ScanState::DoubleQuote,
                    ScanState::DoubleQuote => ScanState::Normal,
                    other => other,
                };
                out.push(c);
            }
            _ => out.push(c),
        }
    }

    out
}

/// Index of the `:` or `;` ending the property name, or `bytes.len()`.
fn scan_property_name(bytes: &[u8], start: usize) -> usize {
    let mut quote: Option<u8> = None;
    let mut i = start;

    while i < bytes.len() {
        let b = bytes[i];
        match (quote, b) {
            (_, b'\\') => i += 1,
            (None, b'"') | (None, b'\'') => quote = Some(b),
            (Some(q), b) if q == b => quote = None,
            (None, b':') | (None, b';') => return i,
            _ => {}
        }
        i += 1;
    }

    bytes.len()
}

/// Index of the `;` ending the value, or `bytes.len()`.
fn scan_value(bytes: &[u8], start: usize) -> usize {
    let mut quote: Option<u8> = None;
    let mut depth = 0usize;
    let mut i = start;

    while i < bytes.len() {
        let b = bytes[i];
        match (quote, b) {
            (_, b'\\') => i += 1,
            (None, b'"') | (None, b'\'') => quote = Some(b),
            (Some(q), b) if q == b => quote = None,
            (None, b'(') => depth += 1,
            (None, b')') => depth = depth.saturating_sub(1),
            (None, b';') if depth == 0 => return i,
            _ => {}
        }
        i += 1;
    }

    bytes.len()
}

/// Property identifiers: `[a-z0-9_-]+`, not starting with a digit
/// (custom properties such as `--accent` included).
fn is_property_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
}
