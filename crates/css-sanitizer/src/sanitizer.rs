//! Stylesheet sanitizer
//!
//! Pipeline: size check, [`xss_entity_decode`], whole-sheet rejection
//! (`@import`, double escapes), structural split, then per rule selector
//! scoping and declaration policy. Internal stages return
//! [`SanitizerResult`]; the public methods turn `Hostile` into
//! [`EVIL_MARKER`] and every other failure into [`INVALID_MARKER`].

use crate::block::{parse_css_block, Declaration};
use crate::config::SanitizerConfig;
use crate::decode::{has_residual_escape, xss_entity_decode};
use crate::error::{SanitizerError, SanitizerResult};
use crate::policy::{normalize_whitespace, sanitize_declaration, PolicyOutcome};
use crate::selector::{is_selector_text, keyframe_selector_list, rewrite_selector_list};
use crate::stylesheet::{
    split_at_rule, split_blocks, strip_nested_blocks, AtRuleBlock, AtRuleBody, AtRuleKind, Node,
    RawNode, Rule, StructuralBytes, Stylesheet,
};
use crate::{EVIL_MARKER, INVALID_MARKER};

/// Keywords that make a selector or at-rule prelude hostile
const HOSTILE_PRELUDE_KEYWORDS: [&str; 3] = ["expression(", "javascript:", "vbscript:"];

/// Overall outcome of a sanitization pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Every rule and declaration survived unchanged (selectors are always scoped)
    Clean,
    /// Something was dropped or rewritten
    Sanitized,
    /// Input had no usable structure; output is [`INVALID_MARKER`]
    Invalid,
    /// Input carried a whole-sheet attack; output is [`EVIL_MARKER`]
    Evil,
}

impl Verdict {
    /// Whether the whole stylesheet was replaced by a sentinel
    pub fn is_rejected(self) -> bool {
        matches!(self, Verdict::Invalid | Verdict::Evil)
    }
}

/// Sanitized text plus what happened to produce it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizeReport {
    /// Sanitized stylesheet or a sentinel comment
    pub css: String,
    /// Overall outcome
    pub verdict: Verdict,
    /// Style rules emitted
    pub rules: usize,
    /// Rules and at-rules removed
    pub dropped_rules: usize,
    /// Declarations removed by the policy
    pub dropped_declarations: usize,
    /// Declarations rewritten by the policy
    pub rewritten_declarations: usize,
}

/// Running counts for one pass
#[derive(Debug, Default)]
struct Tally {
    rules: usize,
    dropped_rules: usize,
    dropped_declarations: usize,
    rewritten_declarations: usize,
}

impl Tally {
    fn into_report(self, css: String, verdict: Verdict) -> SanitizeReport {
        SanitizeReport {
            css,
            verdict,
            rules: self.rules,
            dropped_rules: self.dropped_rules,
            dropped_declarations: self.dropped_declarations,
            rewritten_declarations: self.rewritten_declarations,
        }
    }

    fn is_clean(&self) -> bool {
        self.dropped_rules == 0 && self.dropped_declarations == 0 && self.rewritten_declarations == 0
    }
}

/// Scopes and sanitizes untrusted stylesheets for display inside a container.
///
/// A sanitizer holds only its validated configuration, so one instance can be
/// shared across threads.
#[derive(Debug, Clone)]
pub struct CssSanitizer {
    config: SanitizerConfig,
}

impl CssSanitizer {
    /// Create a sanitizer, rejecting configuration that could inject selector syntax
    pub fn new(config: SanitizerConfig) -> SanitizerResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Get the sanitizer configuration
    pub fn config(&self) -> &SanitizerConfig {
        &self.config
    }

    /// Sanitize a stylesheet, returning CSS text or a sentinel comment
    pub fn sanitize(&self, css: &str) -> String {
        self.sanitize_with_report(css).css
    }

    /// Sanitize a stylesheet and report what was removed or rewritten
    pub fn sanitize_with_report(&self, css: &str) -> SanitizeReport {
        let mut tally = Tally::default();

        match self.sanitize_stylesheet(css, &mut tally) {
            Ok(sheet) => {
                let verdict = if tally.is_clean() {
                    Verdict::Clean
                } else {
                    Verdict::Sanitized
                };
                tally.into_report(sheet.to_string(), verdict)
            }
            Err(SanitizerError::Hostile(reason)) => {
                tracing::warn!("🚨 Rejecting hostile stylesheet: {}", reason);
                tally.into_report(EVIL_MARKER.to_string(), Verdict::Evil)
            }
            Err(err) => {
                tracing::warn!("⚠️ Rejecting stylesheet: {}", err);
                tally.into_report(INVALID_MARKER.to_string(), Verdict::Invalid)
            }
        }
    }

    /// Sanitize the body of an inline `style` attribute.
    ///
    /// Returns the surviving declarations as `a: b; c: d`, or an empty string
    /// when the text is hostile as a whole.
    pub fn sanitize_block(&self, style: &str) -> String {
        if style.len() > self.config.max_css_size {
            tracing::warn!("⚠️ Inline style exceeds {} bytes", self.config.max_css_size);
            return String::new();
        }

        let text = xss_entity_decode(style);
        if let Err(err) = check_whole_sheet(&text) {
            tracing::warn!("🚨 Rejecting inline style: {}", err);
            return String::new();
        }

        let mut tally = Tally::default();
        self.sanitize_declarations(&text, &mut tally)
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn sanitize_stylesheet(&self, css: &str, tally: &mut Tally) -> SanitizerResult<Stylesheet> {
        if css.len() > self.config.max_css_size {
            return Err(SanitizerError::Malformed(format!(
                "stylesheet exceeds {} bytes",
                self.config.max_css_size
            )));
        }

        let text = xss_entity_decode(css);
        check_whole_sheet(&text)?;

        let raw = split_blocks(&text)?;
        if !raw.iter().any(|node| matches!(node, RawNode::Block { .. })) {
            return Err(SanitizerError::Malformed("no rule blocks".to_string()));
        }

        let nodes = self.sanitize_nodes(raw, 0, tally)?;
        if nodes.is_empty() {
            return Err(SanitizerError::Malformed("no rule survived".to_string()));
        }
        Ok(Stylesheet { nodes })
    }

    fn sanitize_nodes(
        &self,
        raw: Vec<RawNode<'_>>,
        depth: usize,
        tally: &mut Tally,
    ) -> SanitizerResult<Vec<Node>> {
        let mut nodes = Vec::with_capacity(raw.len());

        for item in raw {
            match item {
                RawNode::Statement { prelude } => {
                    check_prelude(prelude)?;
                    let (name, _) = split_at_rule(prelude);
                    if AtRuleKind::from_name(&name) == AtRuleKind::Import {
                        return Err(SanitizerError::Hostile("@import".to_string()));
                    }
                    tracing::debug!("🗑️ Dropping @{} statement", name);
                    tally.dropped_rules += 1;
                }
                RawNode::Block { prelude, body } => {
                    let prelude = prelude
                        .trim_start_matches(|c: char| c == ';' || c.is_whitespace())
                        .trim_end();
                    check_prelude(prelude)?;

                    if prelude.starts_with('@') {
                        if let Some(block) = self.sanitize_at_rule(prelude, body, depth, tally)? {
                            nodes.push(Node::AtRule(block));
                        }
                    } else if let Some(rule) = self.sanitize_rule(prelude, body, tally) {
                        nodes.push(Node::Rule(rule));
                    }
                }
            }
        }

        Ok(nodes)
    }

    fn sanitize_rule(&self, prelude: &str, body: &str, tally: &mut Tally) -> Option<Rule> {
        let selectors = match rewrite_selector_list(
            prelude,
            &self.config.container_id,
            &self.config.class_prefix,
        ) {
            Some(selectors) => selectors,
            None => {
                tracing::debug!("🚫 Dropping rule with unusable selector {:?}", prelude);
                tally.dropped_rules += 1;
                return None;
            }
        };

        tally.rules += 1;
        Some(Rule {
            selectors,
            declarations: self.sanitize_declarations(body, tally),
        })
    }

    fn sanitize_at_rule(
        &self,
        prelude: &str,
        body: &str,
        depth: usize,
        tally: &mut Tally,
    ) -> SanitizerResult<Option<AtRuleBlock>> {
        let (name, rest) = split_at_rule(prelude);
        let kind = AtRuleKind::from_name(&name);

        let body = match kind {
            AtRuleKind::Import => return Err(SanitizerError::Hostile("@import".to_string())),
            kind if kind.is_group() => {
                if depth >= self.config.max_nesting_depth {
                    tracing::debug!("🗑️ Dropping @{} nested deeper than {}", name, self.config.max_nesting_depth);
                    return Ok(drop_at_rule(&name, tally));
                }
                if !is_selector_text(rest) {
                    return Ok(drop_at_rule(&name, tally));
                }
                AtRuleBody::Rules(self.sanitize_nodes(split_blocks(body)?, depth + 1, tally)?)
            }
            AtRuleKind::Keyframes => {
                if !is_keyframes_name(rest) {
                    return Ok(drop_at_rule(&name, tally));
                }
                AtRuleBody::Rules(self.sanitize_keyframes(body, tally)?)
            }
            AtRuleKind::FontFace if rest.is_empty() => {
                AtRuleBody::Declarations(self.sanitize_declarations(body, tally))
            }
            _ => return Ok(drop_at_rule(&name, tally)),
        };

        Ok(Some(AtRuleBlock {
            kind,
            name,
            prelude: normalize_whitespace(rest),
            body,
        }))
    }

    fn sanitize_keyframes(&self, body: &str, tally: &mut Tally) -> SanitizerResult<Vec<Node>> {
        let mut frames = Vec::new();

        for item in split_blocks(body)? {
            let (selector, frame_body) = match item {
                RawNode::Block { prelude, body } => (prelude, body),
                RawNode::Statement { .. } => {
                    tally.dropped_rules += 1;
                    continue;
                }
            };

            match keyframe_selector_list(selector) {
                Some(selectors) => {
                    tally.rules += 1;
                    frames.push(Node::Rule(Rule {
                        selectors,
                        declarations: self.sanitize_declarations(frame_body, tally),
                    }));
                }
                None => {
                    tracing::debug!("🚫 Dropping keyframe {:?}", selector.trim());
                    tally.dropped_rules += 1;
                }
            }
        }

        Ok(frames)
    }

    fn sanitize_declarations(&self, body: &str, tally: &mut Tally) -> Vec<Declaration> {
        let flat = strip_nested_blocks(body);
        if flat.len() < body.len() {
            tracing::debug!("🗑️ Dropping nested rules inside a declaration block");
            tally.dropped_rules += 1;
        }

        let mut declarations = Vec::new();
        for declaration in parse_css_block(&flat) {
            if has_structural_brace(&declaration.value) {
                tracing::debug!("🚫 Dropping {}: stray brace", declaration.property);
                tally.dropped_declarations += 1;
                continue;
            }

            match sanitize_declaration(&declaration, &self.config) {
                PolicyOutcome::Keep(kept) => declarations.push(kept),
                PolicyOutcome::Rewrite(rewritten) => {
                    tracing::debug!("✏️ Rewrote {}: {} -> {}", declaration.property, declaration.value, rewritten.value);
                    tally.rewritten_declarations += 1;
                    declarations.push(rewritten);
                }
                PolicyOutcome::Drop(reason) => {
                    tracing::debug!("🚫 Dropping {}: {}", declaration.property, reason);
                    tally.dropped_declarations += 1;
                }
            }
        }

        declarations
    }
}

fn drop_at_rule<T>(name: &str, tally: &mut Tally) -> Option<T> {
    tracing::debug!("🗑️ Dropping @{} block", name);
    tally.dropped_rules += 1;
    None
}

/// Reject decoded text that is hostile regardless of structure.
fn check_whole_sheet(text: &str) -> SanitizerResult<()> {
    if text.to_ascii_lowercase().contains("@import") {
        return Err(SanitizerError::Hostile("@import".to_string()));
    }
    if has_residual_escape(text) {
        return Err(SanitizerError::Hostile("escape sequence survived decoding".to_string()));
    }
    Ok(())
}

fn check_prelude(prelude: &str) -> SanitizerResult<()> {
    let lower = prelude.to_ascii_lowercase();
    match HOSTILE_PRELUDE_KEYWORDS.iter().find(|keyword| lower.contains(*keyword)) {
        Some(keyword) => Err(SanitizerError::Hostile(format!("{:?} in selector", keyword))),
        None => Ok(()),
    }
}

fn has_structural_brace(value: &str) -> bool {
    StructuralBytes::new(value).any(|(_, b)| b == b'{' || b == b'}')
}

fn is_keyframes_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sanitizer(container: &str) -> CssSanitizer {
        CssSanitizer::new(SanitizerConfig::new(container)).unwrap()
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(matches!(
            CssSanitizer::new(SanitizerConfig::new("a b")),
            Err(SanitizerError::InvalidContainerId(_))
        ));
        assert!(matches!(
            CssSanitizer::new(SanitizerConfig::new("rc").with_prefix("x{")),
            Err(SanitizerError::InvalidClassPrefix(_))
        ));
    }

    #[test]
    fn test_basic_rule() {
        let report = sanitizer("rcmbody").sanitize_with_report("p { color: red; }");
        assert_eq!(report.css, "#rcmbody p { color: red; }");
        assert_eq!(report.verdict, Verdict::Clean);
        assert_eq!(report.rules, 1);
    }

    #[test]
    fn test_report_counts() {
        let report = sanitizer("c").sanitize_with_report(
            "p { left: expression(1); position: fixed; color: red } @page { margin: 0 }",
        );
        assert_eq!(report.css, "#c p { position: absolute; color: red; }");
        assert_eq!(report.verdict, Verdict::Sanitized);
        assert_eq!(report.rules, 1);
        assert_eq!(report.dropped_rules, 1);
        assert_eq!(report.dropped_declarations, 1);
        assert_eq!(report.rewritten_declarations, 1);
    }

    #[test]
    fn test_sentinels() {
        let s = sanitizer("c");
        let report = s.sanitize_with_report("font-size: 1em;");
        assert_eq!(report.css, INVALID_MARKER);
        assert_eq!(report.verdict, Verdict::Invalid);
        assert!(report.verdict.is_rejected());

        assert_eq!(s.sanitize(""), INVALID_MARKER);
        assert_eq!(s.sanitize("a { color: red"), INVALID_MARKER);
        assert_eq!(s.sanitize("a { } }"), INVALID_MARKER);
        assert_eq!(s.sanitize("@IMPORT 'x.css';"), EVIL_MARKER);
        assert_eq!(s.sanitize("a { } @media x { @import 'y'; }"), EVIL_MARKER);
        assert_eq!(s.sanitize("a[x=expression(1)] { }"), EVIL_MARKER);
        assert_eq!(s.sanitize("@media javascript:x { a { } }"), EVIL_MARKER);
    }

    #[test]
    fn test_size_limit() {
        let mut config = SanitizerConfig::new("c");
        config.max_css_size = 16;
        let s = CssSanitizer::new(config).unwrap();
        assert_eq!(s.sanitize("a { color: red; }"), INVALID_MARKER);
        assert_eq!(s.sanitize("a { top: 0 }"), "#c a { top: 0; }");
    }

    #[test]
    fn test_media_rules_are_scoped() {
        let out = sanitizer("c").sanitize("@media screen and (max-width: 600px) { body { width: 600px } p { top: 0 } }");
        assert_eq!(
            out,
            "@media screen and (max-width: 600px) {\n#c { width: 600px; }\n#c p { top: 0; }\n}"
        );
    }

    #[test]
    fn test_nesting_depth() {
        let s = sanitizer("c");
        let out = s.sanitize("@media a { @supports (display: grid) { @media b { p { top: 0 } } p { left: 0 } } }");
        assert_eq!(
            out,
            "@media a {\n@supports (display: grid) {\n#c p { left: 0; }\n}\n}"
        );
    }

    #[test]
    fn test_dropped_at_rules() {
        let s = sanitizer("c");
        assert_eq!(s.sanitize("@page { margin: 0 } @charset \"utf-8\"; p { top: 0 }"), "#c p { top: 0; }");
        assert_eq!(s.sanitize("@-moz-document url-prefix() { p { top: 0 } } a { }"), "#c a {}");
        assert_eq!(s.sanitize("@unknown x { p { top: 0 } } a { }"), "#c a {}");
    }

    #[test]
    fn test_keyframes_and_font_face() {
        let s = sanitizer("c");
        assert_eq!(
            s.sanitize("@-webkit-keyframes spin { FROM { top: 0 } 50% { left: expression(1) } to { top: 1px } }"),
            "@-webkit-keyframes spin {\nfrom { top: 0; }\n50% {}\nto { top: 1px; }\n}"
        );
        assert_eq!(s.sanitize("@keyframes 1bad { from { top: 0 } } a { }"), "#c a {}");
        assert_eq!(
            s.sanitize("@font-face { font-family: x; src: url(http://evil.example/f.woff) }"),
            "@font-face { font-family: x; }"
        );
    }

    #[test]
    fn test_hostile_selector_drops_rule() {
        let s = sanitizer("c");
        let report = s.sanitize_with_report("a;b { top: 0 } p { left: 0 }");
        assert_eq!(report.css, "#c p { left: 0; }");
        assert_eq!(report.dropped_rules, 1);
    }

    #[test]
    fn test_no_surviving_rule_is_invalid() {
        let s = sanitizer("c");
        let report = s.sanitize_with_report("a;b { top: 0 }");
        assert_eq!(report.css, INVALID_MARKER);
        assert_eq!(report.verdict, Verdict::Invalid);
        assert_eq!(report.dropped_rules, 1);
        assert_eq!(s.sanitize("@page { margin: 0 }"), INVALID_MARKER);
        assert_eq!(s.sanitize("p { top: 0 }"), "#c p { top: 0; }");
    }

    #[test]
    fn test_body_behind_ancestors_is_the_container() {
        let out = sanitizer("rc").sanitize("html body { color: red } @media screen { html > body p { top: 0 } }");
        assert_eq!(out, "#rc { color: red; }\n@media screen {\n#rc p { top: 0; }\n}");
    }

    #[test]
    fn test_nested_rules_are_removed() {
        assert_eq!(sanitizer("c").sanitize("p { x: @im{}port; top: 0 }"), "#c p { x: @im; top: 0; }");
        let report = sanitizer("c").sanitize_with_report("p { color: red; & span { color: blue } top: 0 }");
        assert_eq!(report.css, "#c p { color: red; top: 0; }");
        assert_eq!(report.dropped_rules, 1);
    }

    #[test]
    fn test_stray_semicolons_between_rules() {
        let out = sanitizer("c").sanitize("a { top: 0 }; b { left: 0 }");
        assert_eq!(out, "#c a { top: 0; }\n#c b { left: 0; }");
    }

    #[test]
    fn test_sanitize_block() {
        let s = sanitizer("c");
        assert_eq!(s.sanitize_block("color: red; position: fixed; behavior: url(x.htc)"), "color: red; position: absolute");
        assert_eq!(s.sanitize_block("top: 0 } body { color: red"), "");
        assert_eq!(s.sanitize_block("left: e\\78pression(1); top: 0"), "top: 0");
        assert_eq!(s.sanitize_block("@\\5C 69mport x; top: 0"), "");
    }

    #[test]
    fn test_empty_container_is_unscoped() {
        assert_eq!(sanitizer("").sanitize("p { top: 0 }"), "p { top: 0; }");
    }
}
