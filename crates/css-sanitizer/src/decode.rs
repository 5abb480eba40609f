//! Escape and entity normalization for untrusted CSS
//!
//! Browsers resolve CSS escapes before interpreting a stylesheet, so every
//! keyword check downstream runs on the output of [`xss_entity_decode`] and
//! never on the raw bytes. The passes run in a fixed order:
//!
//! 1. HTML character references, decoded twice (`&amp;lt;` ends up as `<`)
//! 2. HTML comment delimiters `<!--` / `-->` dropped, their content kept
//! 3. CSS escapes (`\75`, `\000075 `, `\r`, backslash-newline) resolved
//! 4. `/* ... */` comments removed
//! 5. tag-like fragments (`</style>`, `<img ...>`) stripped
//!
//! Each pass is a single forward scan.

use lazy_static::lazy_static;
use markup5ever::data::NAMED_ENTITIES;
use regex::Regex;

lazy_static! {
    static ref RESIDUAL_ESCAPE: Regex = Regex::new(r"\\[0-9A-Fa-f]").unwrap();
}

/// Longest named reference worth looking up (`&CounterClockwiseContourIntegral;`)
const MAX_ENTITY_NAME: usize = 32;

/// Decode every obfuscation layer an attacker can wrap around CSS text.
pub fn xss_entity_decode(content: &str) -> String {
    let decoded = decode_html_entities(&decode_html_entities(content));
    let decoded = decoded.replace("<!--", "").replace("-->", "");
    let decoded = decode_css_escapes(&decoded);
    let decoded = strip_css_comments(&decoded);
    strip_tags(&decoded)
}

/// Whether an escape sequence survived decoding, i.e. the input was escaped
/// twice (`\5C 69` decodes to the literal text `\69`).
pub(crate) fn has_residual_escape(text: &str) -> bool {
    RESIDUAL_ESCAPE.is_match(text)
}

/// Resolve HTML numeric and named character references.
///
/// Named references need their terminating `;`; anything that does not parse
/// as a reference is copied through untouched.
pub fn decode_html_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];

        match push_char_ref(rest, &mut out) {
            Some(consumed) => rest = &rest[consumed..],
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// Decode the reference at the start of `s` (which begins with `&`) into
/// `out`, returning the number of bytes consumed.
fn push_char_ref(s: &str, out: &mut String) -> Option<usize> {
    let bytes = s.as_bytes();

    if bytes.get(1) == Some(&b'#') {
        let (radix, start) = match bytes.get(2) {
            Some(b'x') | Some(b'X') => (16, 3),
            _ => (10, 2),
        };

        let digits = bytes[start..]
            .iter()
            .take_while(|b| (**b as char).is_digit(radix))
            .count();
        let end = start + digits;
        if digits == 0 || bytes.get(end) != Some(&b';') {
            return None;
        }

        let code = u32::from_str_radix(&s[start..end], radix).ok();
        out.push(code_point_or_replacement(code));
        return Some(end + 1);
    }

    let name_len = bytes[1..]
        .iter()
        .take(MAX_ENTITY_NAME)
        .take_while(|b| b.is_ascii_alphanumeric())
        .count();
    let end = 1 + name_len;
    if name_len == 0 || bytes.get(end) != Some(&b';') {
        return None;
    }

    // Entity table keys carry the trailing semicolon; prefixes map to (0, 0).
    match NAMED_ENTITIES.get(&s[1..=end]) {
        Some(&(first, second)) if first != 0 => {
            out.push(code_point_or_replacement(Some(first)));
            if second != 0 {
                out.push(code_point_or_replacement(Some(second)));
            }
            Some(end + 1)
        }
        _ => None,
    }
}

/// Resolve CSS escape sequences in a single pass.
///
/// A backslash produced by an escape is emitted as text and never starts a
/// new escape; [`has_residual_escape`] reports such leftovers.
pub fn decode_css_escapes(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }

        match chars.peek().copied() {
            None => {}
            Some(h) if h.is_ascii_hexdigit() => {
                let mut code: u32 = 0;
                let mut count = 0;
                while count < 6 {
                    match chars.peek().and_then(|d| d.to_digit(16)) {
                        Some(digit) => {
                            code = code * 16 + digit;
                            count += 1;
                            chars.next();
                        }
                        None => break,
                    }
                }

                // One whitespace character terminates the escape
                match chars.peek().copied() {
                    Some('\r') => {
                        chars.next();
                        if chars.peek() == Some(&'\n') {
                            chars.next();
                        }
                    }
                    Some(' ') | Some('\t') | Some('\n') | Some('\x0c') => {
                        chars.next();
                    }
                    _ => {}
                }

                out.push(code_point_or_replacement(Some(code)));
            }
            Some('\r') => {
                chars.next();
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
            }
            Some('\n') | Some('\x0c') => {
                chars.next();
            }
            Some(other) => {
                chars.next();
                out.push(other);
            }
        }
    }

    out
}

/// Remove `/* ... */` comments; an unterminated comment runs to the end.
pub fn strip_css_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => return out,
        }
    }

    out.push_str(rest);
    out
}

/// Strip tag-like fragments the way an HTML tokenizer would see them.
///
/// `<` only opens a tag when followed by a letter, `/`, `!` or `?`, so text
/// such as `< page` survives. A run of `<` in front of a tag opener belongs
/// to that tag, so removing the tag never joins a stray `<` to the text after
/// it (`<<b>/style>` leaves `/style>`). Quotes inside a tag hide `>`; an
/// unterminated tag swallows the rest of the input.
pub fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('<') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];

        let run = rest.len() - rest.trim_start_matches('<').len();
        let opens_tag = matches!(
            rest[run..].chars().next(),
            Some(n) if n.is_ascii_alphabetic() || matches!(n, '/' | '!' | '?')
        );
        if !opens_tag {
            out.push_str(&rest[..run]);
            rest = &rest[run..];
            continue;
        }

        rest = skip_tag(&rest[run..]);
    }

    out.push_str(rest);
    out
}

/// Text after the `>` closing the tag at the start of `tag`.
fn skip_tag(tag: &str) -> &str {
    let mut quote: Option<char> = None;
    for (i, t) in tag.char_indices() {
        match (quote, t) {
            (None, '"') | (None, '\'') => quote = Some(t),
            (Some(q), t) if q == t => quote = None,
            (None, '>') => return &tag[i + 1..],
            _ => {}
        }
    }
    ""
}

fn code_point_or_replacement(code: Option<u32>) -> char {
    code.filter(|c| *c != 0)
        .and_then(char::from_u32)
        .unwrap_or(char::REPLACEMENT_CHARACTER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_encoded_tags_are_stripped() {
        let out = xss_entity_decode("&lt;img/src=x onerror=alert(1)// </b>");
        assert!(!out.contains("<img"), "Strip (encoded) tags from style node: {}", out);
    }

    #[test]
    fn test_escaped_tags_in_content_are_stripped() {
        let out = xss_entity_decode(r#"#foo:after{content:"\003Cimg/src=x onerror=alert(2)>";}"#);
        assert!(!out.contains("<img"), "Strip (encoded) tags from content property: {}", out);
        assert_eq!(out, r#"#foo:after{content:"";}"#);
    }

    #[test]
    fn test_escape_sequences_resolve() {
        let out = xss_entity_decode(r"background: u\r\00006c('/images/img.png')");
        assert!(out.contains("url("), "Escape sequences resolving: {}", out);
    }

    #[test]
    fn test_html_comment_delimiters_keep_content() {
        let out = xss_entity_decode("<!-- #foo { content:css; } -->");
        assert!(out.contains("#foo"));
        assert_eq!(out.trim(), "#foo { content:css; }");
    }

    #[test]
    fn test_double_encoded_entities() {
        assert_eq!(xss_entity_decode("&amp;lt;b&amp;gt;x"), "x");
        assert_eq!(decode_html_entities("&#039;a&#x27;"), "'a'");
        assert_eq!(decode_html_entities("&quot;&nbsp;&"), "\"\u{a0}&");
    }

    #[test]
    fn test_malformed_entities_pass_through() {
        assert_eq!(decode_html_entities("a & b"), "a & b");
        assert_eq!(decode_html_entities("&#;"), "&#;");
        assert_eq!(decode_html_entities("&#12"), "&#12");
        assert_eq!(decode_html_entities("&notanentity;"), "&notanentity;");
        assert_eq!(decode_html_entities("&#0;"), "\u{fffd}");
    }

    #[test]
    fn test_css_escape_forms() {
        assert_eq!(decode_css_escapes(r"\65xpression"), "expression");
        assert_eq!(decode_css_escapes(r"\75 \72 \6C ("), "url(");
        assert_eq!(decode_css_escapes(r"\0075\0072\00006c("), "url(");
        assert_eq!(decode_css_escapes("u\\r\\l"), "url");
        assert_eq!(decode_css_escapes("a\\\nb"), "ab");
        assert_eq!(decode_css_escapes("a\\\r\nb"), "ab");
        assert_eq!(decode_css_escapes("\\000000"), "\u{fffd}");
        assert_eq!(decode_css_escapes("\\110000"), "\u{fffd}");
        assert_eq!(decode_css_escapes("trailing\\"), "trailing");
    }

    #[test]
    fn test_escape_output_is_not_reinterpreted() {
        let out = decode_css_escapes(r"@\5C 69mport");
        assert_eq!(out, r"@\69mport");
        assert!(has_residual_escape(&out));
        assert!(!has_residual_escape("no escapes here"));
        assert!(!has_residual_escape(r"\zz"));
    }

    #[test]
    fn test_comment_removal() {
        assert_eq!(strip_css_comments("exp/*  */ression"), "expression");
        assert_eq!(strip_css_comments("a /* b */ c /* d"), "a  c ");
        assert_eq!(strip_css_comments("no comment"), "no comment");
    }

    #[test]
    fn test_strip_tags_respects_quotes() {
        assert_eq!(
            strip_tags(r#"'</style><img src onerror="alert('hello');">'"#),
            "''"
        );
        assert_eq!(strip_tags("'< page: ;/style>'"), "'< page: ;/style>'");
        assert_eq!(strip_tags("p > i"), "p > i");
        assert_eq!(strip_tags("a <b unterminated"), "a ");
    }

    #[test]
    fn test_strip_tags_does_not_rebuild_tags() {
        assert_eq!(strip_tags("<<b>/style>"), "/style>");
        assert_eq!(strip_tags("'<<<i>/style><<i>script>x'"), "'/style>script>x'");
        assert_eq!(strip_tags("a << b"), "a << b");
        assert_eq!(strip_tags("<< <b>/style>"), "<< /style>");
        let out = xss_entity_decode("&lt;&lt;b&gt;/style&gt;&lt;<b>img src=x>");
        assert!(!out.contains("</style") && !out.contains("<img"), "{}", out);
    }
}
