//! Declaration policy
//!
//! Decides keep / rewrite / drop for every declaration of a rule. Property
//! names and function names are mapped onto closed enumerations first, so the
//! policy below is an exhaustive match rather than open string comparisons.
//! Values reaching this module have already been through
//! [`crate::decode::xss_entity_decode`].

use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use url::Url;

use crate::block::Declaration;
use crate::config::SanitizerConfig;

lazy_static! {
    static ref DATA_IMAGE_URI: Regex =
        Regex::new(r"(?i)^data:image/[a-z0-9.+-]+(;[a-z0-9._=-]+)*;base64,[a-z0-9+/=]*$").unwrap();
    static ref STRICT_REMOTE_URL: Regex = Regex::new(r"(?i)^https?://[a-z0-9/._+-]+$").unwrap();
}

/// Value substrings that mean script execution or unreliable fetches
const SCRIPT_KEYWORDS: [&str; 4] = ["expression", "javascript:", "vbscript:", "image-set"];

/// Properties the policy treats specially
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    /// `page`: print pagination, dropped
    Page,
    /// `position`: `fixed` escapes the container
    Position,
    /// IE `behavior`: loads scripted HTC components
    Behavior,
    /// Gecko `-moz-binding`: loads scripted XBL bindings
    MozBinding,
    /// Everything else, checked on its value only
    Other,
}

impl PropertyKind {
    /// Classify a lower-cased property name
    pub fn from_name(name: &str) -> Self {
        match name {
            "page" => PropertyKind::Page,
            "position" => PropertyKind::Position,
            "behavior" => PropertyKind::Behavior,
            "-moz-binding" => PropertyKind::MozBinding,
            _ => PropertyKind::Other,
        }
    }

    /// Whether declarations of this property are always removed
    pub fn is_banned(self) -> bool {
        matches!(self, PropertyKind::Page | PropertyKind::Behavior | PropertyKind::MozBinding)
    }
}

/// CSS functions the policy treats specially
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CssFunction {
    /// Fetches its argument: `url()`, `src()`
    Url,
    /// Executes script, references page elements or fetches lists of targets
    Blocked,
    /// Anything else (`rgb()`, `calc()`, `linear-gradient()`, ...)
    Other,
}

impl CssFunction {
    /// Classify a lower-cased function name
    pub fn from_name(name: &str) -> Self {
        match name {
            "url" | "src" => CssFunction::Url,
            "expression" | "image-set" | "-webkit-image-set" | "image" | "cross-fade"
            | "-webkit-cross-fade" | "element" | "-moz-element" => CssFunction::Blocked,
            _ => CssFunction::Other,
        }
    }
}

/// Why a declaration was removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Property is never allowed
    BannedProperty,
    /// Value mentions a script-execution keyword
    ScriptKeyword,
    /// Value calls a blocked function
    BlockedFunction,
    /// `url()` argument could not be parsed
    MalformedUrl,
    /// `url()` target is not an allowed image or remote URL
    DisallowedUrl,
    /// Markup characters outside a string
    Markup,
    /// Nothing left after normalization
    EmptyValue,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            DropReason::BannedProperty => "banned property",
            DropReason::ScriptKeyword => "script keyword",
            DropReason::BlockedFunction => "blocked function",
            DropReason::MalformedUrl => "malformed url()",
            DropReason::DisallowedUrl => "disallowed url() target",
            DropReason::Markup => "markup outside string",
            DropReason::EmptyValue => "empty value",
        };
        f.write_str(reason)
    }
}

/// Result of applying the policy to one declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyOutcome {
    /// Declaration is safe as written (modulo whitespace)
    Keep(Declaration),
    /// Declaration was changed to make it safe
    Rewrite(Declaration),
    /// Declaration must not be emitted
    Drop(DropReason),
}

/// Apply the declaration policy.
pub fn sanitize_declaration(declaration: &Declaration, config: &SanitizerConfig) -> PolicyOutcome {
    let kind = PropertyKind::from_name(&declaration.property);
    if kind.is_banned() {
        return PolicyOutcome::Drop(DropReason::BannedProperty);
    }

    let value = normalize_whitespace(&declaration.value);
    if value.is_empty() {
        return PolicyOutcome::Drop(DropReason::EmptyValue);
    }

    let lower = value.to_ascii_lowercase();
    if SCRIPT_KEYWORDS.iter().any(|keyword| lower.contains(keyword)) {
        return PolicyOutcome::Drop(DropReason::ScriptKeyword);
    }

    if has_markup_outside_strings(&value) {
        return PolicyOutcome::Drop(DropReason::Markup);
    }

    let value = match check_functions(&value, config) {
        Ok(value) => value,
        Err(reason) => return PolicyOutcome::Drop(reason),
    };

    let positioned = match kind {
        PropertyKind::Position => rewrite_fixed_position(&value),
        PropertyKind::Page | PropertyKind::Behavior | PropertyKind::MozBinding | PropertyKind::Other => None,
    };
    let value = positioned.as_deref().unwrap_or(&value);

    // Strings reach the page through `content`, `quotes` and custom properties
    match neutralize_markup_strings(value) {
        Some(value) => PolicyOutcome::Rewrite(Declaration::new(declaration.property.clone(), value)),
        None if positioned.is_some() => {
            PolicyOutcome::Rewrite(Declaration::new(declaration.property.clone(), value))
        }
        None => PolicyOutcome::Keep(Declaration::new(declaration.property.clone(), value)),
    }
}

/// Whether a `url()` target may be emitted.
pub fn is_allowed_url(target: &str, config: &SanitizerConfig) -> bool {
    if DATA_IMAGE_URI.is_match(target) {
        return true;
    }

    if !config.allow_remote || !STRICT_REMOTE_URL.is_match(target) {
        return false;
    }

    match Url::parse(target) {
        Ok(url) => url
            .host_str()
            .map_or(false, |host| config.is_host_trusted(host)),
        Err(_) => false,
    }
}

/// Collapse whitespace runs outside strings into one space and trim.
pub fn normalize_whitespace(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut quote: Option<char> = None;
    let mut pending_space = false;
    let mut escaped = false;

    for c in value.chars() {
        if quote.is_none() && c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;

        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else {
            match (quote, c) {
                (Some(q), c) if q == c => quote = None,
                (None, '"') | (None, '\'') => quote = Some(c),
                _ => {}
            }
        }
        out.push(c);
    }

    out
}

/// `<` or `>` outside a quoted string.
fn has_markup_outside_strings(value: &str) -> bool {
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in value.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (_, '\\') => escaped = true,
            (Some(q), c) if q == c => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '<') | (None, '>') => return true,
            _ => {}
        }
    }

    false
}

/// Walk the function calls of a value, validating and normalizing `url()`.
fn check_functions(value: &str, config: &SanitizerConfig) -> Result<String, DropReason> {
    let bytes = value.as_bytes();
    let mut out = String::with_capacity(value.len());
    let mut quote: Option<u8> = None;
    let mut ident_start: Option<usize> = None;
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];

        if let Some(q) = quote {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        if is_ident_byte(b) {
            ident_start.get_or_insert(i);
            i += 1;
            continue;
        }

        if let Some(start) = ident_start.take() {
            let mut paren = i;
            while paren < bytes.len() && bytes[paren].is_ascii_whitespace() {
                paren += 1;
            }

            if bytes.get(paren) == Some(&b'(') {
                let name = value[start..i].to_ascii_lowercase();
                match CssFunction::from_name(&name) {
                    CssFunction::Blocked => return Err(DropReason::BlockedFunction),
                    CssFunction::Url => {
                        let (target, url_quote, end) = parse_url_argument(value, paren + 1)?;
                        if !is_allowed_url(target, config) {
                            return Err(DropReason::DisallowedUrl);
                        }

                        out.push_str(&value[copied..start]);
                        out.push_str(&name);
                        out.push('(');
                        if let Some(q) = url_quote {
                            out.push(q);
                            out.push_str(target);
                            out.push(q);
                        } else {
                            out.push_str(target);
                        }
                        out.push(')');

                        copied = end;
                        i = end;
                        continue;
                    }
                    CssFunction::Other => {}
                }
            }
        }

        match b {
            b'"' | b'\'' => quote = Some(b),
            b'\\' => i += 1,
            _ => {}
        }
        i += 1;
    }

    out.push_str(&value[copied.min(value.len())..]);
    Ok(out)
}

/// Parse the argument of a `url(` call starting at `start` (just past the
/// paren). Returns the target, its quote character and the index after `)`.
fn parse_url_argument(value: &str, start: usize) -> Result<(&str, Option<char>, usize), DropReason> {
    let bytes = value.as_bytes();
    let mut i = start;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }

    let (target, quote, mut i) = match bytes.get(i) {
        Some(&q) if q == b'"' || q == b'\'' => {
            let begin = i + 1;
            let len = bytes[begin..]
                .iter()
                .position(|b| *b == q)
                .ok_or(DropReason::MalformedUrl)?;
            (&value[begin..begin + len], Some(q as char), begin + len + 1)
        }
        Some(_) => {
            let begin = i;
            let len = bytes[begin..]
                .iter()
                .position(|b| *b == b')' || b.is_ascii_whitespace())
                .ok_or(DropReason::MalformedUrl)?;
            let target = &value[begin..begin + len];
            if target.contains(['"', '\'', '(', '\\']) {
                return Err(DropReason::MalformedUrl);
            }
            (target, None, begin + len)
        }
        None => return Err(DropReason::MalformedUrl),
    };

    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    if bytes.get(i) != Some(&b')') {
        return Err(DropReason::MalformedUrl);
    }

    Ok((target, quote, i + 1))
}

/// `fixed` as the first value token becomes `absolute`.
fn rewrite_fixed_position(value: &str) -> Option<String> {
    let head_len = "fixed".len();
    let head = value.get(..head_len)?;
    let rest = &value[head_len..];

    if head.eq_ignore_ascii_case("fixed") && (rest.is_empty() || rest.starts_with([' ', '!'])) {
        Some(format!("absolute{}", rest))
    } else {
        None
    }
}

/// Empty every quoted string that still carries a tag opener.
fn neutralize_markup_strings(value: &str) -> Option<String> {
    let mut out = String::with_capacity(value.len());
    let mut changed = false;
    let mut chars = value.chars();

    while let Some(c) = chars.next() {
        if c != '"' && c != '\'' {
            out.push(c);
            continue;
        }

        let mut body = String::new();
        let mut closed = false;
        while let Some(s) = chars.next() {
            if s == '\\' {
                body.push(s);
                if let Some(escaped) = chars.next() {
                    body.push(escaped);
                }
                continue;
            }
            if s == c {
                closed = true;
                break;
            }
            body.push(s);
        }

        out.push(c);
        if opens_tag(&body) {
            changed = true;
        } else {
            out.push_str(&body);
        }
        if closed {
            out.push(c);
        }
    }

    changed.then_some(out)
}

/// `<` followed by a letter, `/`, `!` or `?`.
fn opens_tag(text: &str) -> bool {
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '<' && matches!(chars.peek(), Some(n) if n.is_ascii_alphabetic() || matches!(n, '/' | '!' | '?')) {
            return true;
        }
    }
    false
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}
