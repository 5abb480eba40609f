//! Citadel's stylesheet sanitizer for untrusted HTML content
//!
//! Takes CSS found in untrusted documents (`<style>` elements of an email,
//! inline `style` attributes) and produces CSS that is safe to render inside a
//! single container element of a trusted page: every selector is scoped
//! beneath the container, script-capable constructs and external fetches are
//! removed, and `position: fixed` cannot escape the container.
//!
//! Whole stylesheets that are structurally unusable come back as
//! [`INVALID_MARKER`]; stylesheets carrying an `@import` or doubly escaped
//! payloads come back as [`EVIL_MARKER`].
//!
//! ```
//! use citadel_css_sanitizer::sanitize;
//!
//! let css = sanitize(".test { position: fixed; }", "rcmbody", false, "");
//! assert_eq!(css, "#rcmbody .test { position: absolute; }");
//! ```

pub mod block;
pub mod config;
pub mod decode;
pub mod error;
pub mod policy;
pub mod sanitizer;
pub mod selector;
pub mod stylesheet;

/// Re-export common types
pub use block::{parse_css_block, Declaration};
pub use config::SanitizerConfig;
pub use decode::xss_entity_decode;
pub use error::{SanitizerError, SanitizerResult};
pub use policy::{sanitize_declaration, PolicyOutcome};
pub use sanitizer::{CssSanitizer, SanitizeReport, Verdict};
pub use selector::rewrite_selector_list;
pub use stylesheet::{AtRuleKind, Stylesheet};

/// Output for stylesheets without usable structure
pub const INVALID_MARKER: &str = "/* invalid! */";

/// Output for stylesheets carrying a whole-sheet attack
pub const EVIL_MARKER: &str = "/* evil! */";

/// Sanitize a stylesheet for display inside `#container_id`.
///
/// `class_prefix` is prepended to every class and id name in selectors;
/// `allow_remote` permits absolute `http(s)://` targets in `url()`. A
/// container id or prefix that is not a plain CSS identifier yields
/// [`INVALID_MARKER`].
pub fn sanitize(css: &str, container_id: &str, allow_remote: bool, class_prefix: &str) -> String {
    let config = SanitizerConfig::new(container_id)
        .with_prefix(class_prefix)
        .with_remote(allow_remote);

    match CssSanitizer::new(config) {
        Ok(sanitizer) => sanitizer.sanitize(css),
        Err(err) => {
            tracing::warn!("⚠️ Refusing to sanitize: {}", err);
            INVALID_MARKER.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sanitize_convenience() {
        assert_eq!(sanitize("p { color: red }", "rc", false, ""), "#rc p { color: red; }");
        assert_eq!(sanitize(".a { top: 0 }", "rc", false, "x"), "#rc .xa { top: 0; }");
    }

    #[test]
    fn test_invalid_parameters_fail_closed() {
        assert_eq!(sanitize("p { }", "rc x", false, ""), INVALID_MARKER);
        assert_eq!(sanitize("p { }", "rc", false, "a,b"), INVALID_MARKER);
    }
}
