//! Stylesheet structure
//!
//! The structural scanner splits stylesheet text into `prelude { body }`
//! blocks and `@statement;` rules. Brace matching skips strings and
//! comments, so a `}` inside `content: "}"` never closes a rule. The
//! sanitized result is kept as a small tree ([`Stylesheet`]) and serialized
//! back to CSS text through `Display`.

use std::fmt;

use crate::block::{format_block, Declaration};
use crate::error::{SanitizerError, SanitizerResult};

/// A style rule: scoped selector list and its surviving declarations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Rewritten selector list
    pub selectors: String,
    /// Declarations in document order
    pub declarations: Vec<Declaration>,
}

/// Known at-rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtRuleKind {
    /// `@media`
    Media,
    /// `@supports`
    Supports,
    /// `@container`
    Container,
    /// `@layer` (block form)
    Layer,
    /// `@keyframes` and vendor-prefixed forms
    Keyframes,
    /// `@font-face`
    FontFace,
    /// `@import`
    Import,
    /// `@charset`
    Charset,
    /// `@namespace`
    Namespace,
    /// `@page`
    Page,
    /// `@document` / `@-moz-document`
    Document,
    /// Anything else
    Other,
}

impl AtRuleKind {
    /// Classify a lower-cased at-rule name (without `@`)
    pub fn from_name(name: &str) -> Self {
        match strip_vendor_prefix(name) {
            "media" => AtRuleKind::Media,
            "supports" => AtRuleKind::Supports,
            "container" => AtRuleKind::Container,
            "layer" => AtRuleKind::Layer,
            "keyframes" => AtRuleKind::Keyframes,
            "font-face" => AtRuleKind::FontFace,
            "import" => AtRuleKind::Import,
            "charset" => AtRuleKind::Charset,
            "namespace" => AtRuleKind::Namespace,
            "page" => AtRuleKind::Page,
            "document" => AtRuleKind::Document,
            _ => AtRuleKind::Other,
        }
    }

    /// Group rules hold nested style rules
    pub fn is_group(self) -> bool {
        matches!(
            self,
            AtRuleKind::Media | AtRuleKind::Supports | AtRuleKind::Container | AtRuleKind::Layer
        )
    }
}

/// Content of an at-rule block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AtRuleBody {
    /// Nested rules (`@media`, `@keyframes`)
    Rules(Vec<Node>),
    /// A declaration list (`@font-face`)
    Declarations(Vec<Declaration>),
}

/// An at-rule with a block, e.g. `@media screen { ... }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtRuleBlock {
    /// Classified name
    pub kind: AtRuleKind,
    /// Lower-cased name without `@`
    pub name: String,
    /// Prelude text after the name, passed through as written
    pub prelude: String,
    /// Block content
    pub body: AtRuleBody,
}

/// Top-level or nested stylesheet item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Style rule
    Rule(Rule),
    /// At-rule block
    AtRule(AtRuleBlock),
}

/// A sanitized stylesheet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stylesheet {
    /// Items in document order
    pub nodes: Vec<Node>,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.selectors, format_block(&self.declarations))
    }
}

impl fmt::Display for AtRuleBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.name)?;
        if !self.prelude.is_empty() {
            write!(f, " {}", self.prelude)?;
        }

        match &self.body {
            AtRuleBody::Declarations(declarations) => write!(f, " {}", format_block(declarations)),
            AtRuleBody::Rules(nodes) if nodes.is_empty() => f.write_str(" {}"),
            AtRuleBody::Rules(nodes) => {
                f.write_str(" {\n")?;
                for node in nodes {
                    writeln!(f, "{}", node)?;
                }
                f.write_str("}")
            }
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Rule(rule) => fmt::Display::fmt(rule, f),
            Node::AtRule(block) => fmt::Display::fmt(block, f),
        }
    }
}

impl fmt::Display for Stylesheet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, node) in self.nodes.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{}", node)?;
        }
        Ok(())
    }
}

/// Unsanitized structural item, borrowing from the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RawNode<'a> {
    /// `prelude { body }`
    Block { prelude: &'a str, body: &'a str },
    /// `@name prelude;`
    Statement { prelude: &'a str },
}

/// Iterator over `(index, byte)` pairs outside strings and comments.
///
/// Escaped bytes are skipped as well, so a `\}` never counts as structure.
pub(crate) struct StructuralBytes<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> StructuralBytes<'a> {
    pub(crate) fn new(text: &'a str) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: 0,
        }
    }
}

impl Iterator for StructuralBytes<'_> {
    type Item = (usize, u8);

    fn next(&mut self) -> Option<Self::Item> {
        let bytes = self.bytes;
        while self.pos < bytes.len() {
            let i = self.pos;
            match bytes[i] {
                b'\\' => self.pos += 2,
                b'/' if bytes.get(i + 1) == Some(&b'*') => {
                    self.pos = find_from(bytes, i + 2, b"*/").map_or(bytes.len(), |end| end + 2);
                }
                q @ (b'"' | b'\'') => {
                    let mut j = i + 1;
                    while j < bytes.len() && bytes[j] != q {
                        j += if bytes[j] == b'\\' { 2 } else { 1 };
                    }
                    self.pos = j + 1;
                }
                b => {
                    self.pos += 1;
                    return Some((i, b));
                }
            }
        }
        None
    }
}

/// Split stylesheet text into blocks and statements.
///
/// Unbalanced braces are a structural error. Text after the last block that
/// never opens one is ignored.
pub(crate) fn split_blocks(text: &str) -> SanitizerResult<Vec<RawNode<'_>>> {
    let mut nodes = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut open = 0;

    for (i, b) in StructuralBytes::new(text) {
        match b {
            b'{' => {
                if depth == 0 {
                    open = i;
                }
                depth += 1;
            }
            b'}' => {
                if depth == 0 {
                    return Err(SanitizerError::Malformed("unexpected '}'".to_string()));
                }
                depth -= 1;
                if depth == 0 {
                    nodes.push(RawNode::Block {
                        prelude: &text[start..open],
                        body: &text[open + 1..i],
                    });
                    start = i + 1;
                }
            }
            b';' if depth == 0 => {
                let prelude = text[start..i].trim();
                if prelude.starts_with('@') {
                    nodes.push(RawNode::Statement { prelude });
                    start = i + 1;
                }
            }
            _ => {}
        }
    }

    if depth > 0 {
        return Err(SanitizerError::Malformed("unclosed block".to_string()));
    }

    let trailing = text[start..].trim();
    if !trailing.is_empty() {
        tracing::debug!("🗑️ Ignoring trailing text without a block ({} bytes)", trailing.len());
    }

    Ok(nodes)
}

/// Remove nested `{ ... }` blocks from a rule body, keeping the rest.
///
/// Each removed block leaves a `;` behind so the text on either side can
/// never join into one token.
pub(crate) fn strip_nested_blocks(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut depth = 0usize;
    let mut copied = 0;

    for (i, b) in StructuralBytes::new(body) {
        match b {
            b'{' => {
                if depth == 0 {
                    out.push_str(&body[copied..i]);
                    out.push(';');
                }
                depth += 1;
            }
            b'}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    copied = i + 1;
                }
            }
            _ => {}
        }
    }

    if depth == 0 {
        out.push_str(&body[copied..]);
    }
    out
}

/// Split `@name rest` into the lower-cased name and the trimmed rest.
pub(crate) fn split_at_rule(prelude: &str) -> (String, &str) {
    let text = prelude.trim_start().trim_start_matches('@');
    let name_len = text
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        .unwrap_or(text.len());
    (text[..name_len].to_ascii_lowercase(), text[name_len..].trim())
}

fn strip_vendor_prefix(name: &str) -> &str {
    for prefix in ["-webkit-", "-moz-", "-ms-", "-o-"] {
        if let Some(rest) = name.strip_prefix(prefix) {
            return rest;
        }
    }
    name
}

fn find_from(bytes: &[u8], start: usize, needle: &[u8]) -> Option<usize> {
    bytes
        .get(start..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + start)
}
