#![no_main]
//! Stylesheet sanitizer fuzzing
//!
//! Feeds arbitrary stylesheets and inline styles through the sanitizer and
//! checks that no script-capable construct reaches the output. A third input
//! places fuzzed text inside a quoted string of a property that carries
//! strings into the page, where nested tag openers used to rebuild markup.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use citadel_css_sanitizer::{CssSanitizer, SanitizerConfig};

/// Keywords that must never appear in sanitized output
const FORBIDDEN: [&str; 7] = [
    "expression(",
    "javascript:",
    "vbscript:",
    "@import",
    "</style",
    "<script",
    "<img",
];

/// Properties whose string values end up in the rendered page
const STRING_PROPERTIES: [&str; 5] = ["font-family", "quotes", "--x", "content", "grid-template-areas"];

#[derive(Debug, Arbitrary)]
struct SanitizerFuzzInput {
    css: String,
    inline_style: String,
    string_property: u8,
    string_body: String,
    in_font_face: bool,
    allow_remote: bool,
    use_prefix: bool,
}

fn assert_clean(input: &str, output: &str) {
    let lower = output.to_ascii_lowercase();
    for needle in FORBIDDEN {
        assert!(
            !lower.contains(needle),
            "{:?} survived: input {:?} output {:?}",
            needle,
            input,
            output
        );
    }
}

fuzz_target!(|input: SanitizerFuzzInput| {
    // Limit input size to keep iterations fast
    if input.css.len() > 10_000 || input.inline_style.len() > 10_000 || input.string_body.len() > 10_000 {
        return;
    }

    let mut config = SanitizerConfig::new("rcmbody").with_remote(input.allow_remote);
    if input.use_prefix {
        config = config.with_prefix("msg");
    }

    let sanitizer = match CssSanitizer::new(config) {
        Ok(sanitizer) => sanitizer,
        Err(_) => return,
    };

    let report = sanitizer.sanitize_with_report(&input.css);
    assert_clean(&input.css, &report.css);

    let block = sanitizer.sanitize_block(&input.inline_style);
    assert_clean(&input.inline_style, &block);

    let property = STRING_PROPERTIES[input.string_property as usize % STRING_PROPERTIES.len()];
    let declaration = format!("{}: \"{}\"", property, input.string_body);
    let css = if input.in_font_face {
        format!("@font-face {{ {} }}", declaration)
    } else {
        format!("p {{ {} }}", declaration)
    };
    assert_clean(&css, &sanitizer.sanitize(&css));
    assert_clean(&declaration, &sanitizer.sanitize_block(&declaration));
});
