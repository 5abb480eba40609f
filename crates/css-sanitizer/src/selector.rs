//! Selector scoping
//!
//! Every selector is moved beneath the display container (`#container sel`)
//! and every class/id token gets the caller's prefix. The document root and
//! `<body>` no longer exist inside the container, so `:root` is dropped and a
//! `body` compound becomes the container itself, together with whatever
//! ancestors (`html body`) were written in front of it.

/// Characters (besides letters, digits and non-ASCII) a selector may contain
const SELECTOR_PUNCTUATION: &str = "-_.#*:()[]=~|^$>+,\"'% \t\n\r\x0c";

/// Rewrite a comma-separated selector list so it only matches inside the
/// container. Returns `None` when the list is hostile or empty.
pub fn rewrite_selector_list(selectors: &str, container_id: &str, prefix: &str) -> Option<String> {
    if !is_selector_text(selectors) {
        return None;
    }

    let rewritten: Vec<String> = split_selector_list(selectors)
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| rewrite_selector(s, container_id, prefix))
        .collect();

    if rewritten.is_empty() {
        None
    } else {
        Some(rewritten.join(", "))
    }
}

/// Normalize a `@keyframes` selector list (`from`, `to`, percentages).
pub fn keyframe_selector_list(selectors: &str) -> Option<String> {
    let members: Vec<String> = selectors
        .split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .collect();

    let valid = members.iter().all(|m| {
        m == "from" || m == "to" || is_percentage(m)
    });

    if valid && !members.is_empty() {
        Some(members.join(", "))
    } else {
        None
    }
}

/// Whether `text` only uses characters that can appear in a selector.
pub fn is_selector_text(text: &str) -> bool {
    text.chars()
        .all(|c| c.is_alphanumeric() || !c.is_ascii() || SELECTOR_PUNCTUATION.contains(c))
}

/// Split on commas outside parens, attribute brackets and quotes.
pub fn split_selector_list(selectors: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in selectors.char_indices() {
        match (quote, c) {
            (Some(q), c) if q == c => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '(') | (None, '[') => depth += 1,
            (None, ')') | (None, ']') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(&selectors[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    parts.push(&selectors[start..]);
    parts
}

/// Scope a single complex selector.
fn rewrite_selector(selector: &str, container_id: &str, prefix: &str) -> String {
    let selector = collapse_whitespace(&strip_root(selector));

    if container_id.is_empty() {
        return apply_prefix(&selector, prefix);
    }

    let container = format!("#{}", container_id);

    if selector.is_empty() {
        return container;
    }

    if selector.starts_with(['~', '+']) {
        // A bare sibling combinator would reach outside the container
        return format!("{} * {}", container, apply_prefix(&selector, prefix));
    }

    let compounds = compound_starts(&selector);
    let combinator_after = |k: usize| compounds.get(k + 1).and_then(|&(_, combinator)| combinator);
    let sibling_follows = |k: usize| matches!(combinator_after(k), Some('~') | Some('+'));

    if !sibling_follows(0) {
        if let Some(rest) = strip_leading_name(&selector, &container) {
            return format!("{}{}", container, apply_prefix(rest, prefix));
        }
    }

    // The last `body` reached through descendant or child combinators
    let body = compounds.iter().enumerate().rev().find(|&(k, &(start, before))| {
        matches!(before, None | Some(' ') | Some('>'))
            && !sibling_follows(k)
            && starts_with_word(&selector[start..], "body")
    });
    if let Some((_, &(start, _))) = body {
        let rest = &selector[start + "body".len()..];
        return format!("{}{}", container, apply_prefix(rest, prefix));
    }

    format!("{} {}", container, apply_prefix(&selector, prefix))
}

/// Prefix class and id names outside attribute brackets and quotes.
fn apply_prefix(selector: &str, prefix: &str) -> String {
    if prefix.is_empty() {
        return selector.to_string();
    }

    let mut out = String::with_capacity(selector.len() + prefix.len() * 2);
    let mut brackets = 0usize;
    let mut quote: Option<char> = None;
    let mut chars = selector.chars().peekable();

    while let Some(c) = chars.next() {
        out.push(c);
        match (quote, c) {
            (Some(q), c) if q == c => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '[') => brackets += 1,
            (None, ']') => brackets = brackets.saturating_sub(1),
            (None, '.') | (None, '#') if brackets == 0 => {
                if chars.peek().map_or(false, |n| is_ident_start(*n)) {
                    out.push_str(prefix);
                }
            }
            _ => {}
        }
    }

    out
}

/// Remove every `:root` pseudo-class outside brackets and quotes.
fn strip_root(selector: &str) -> String {
    let mut out = String::with_capacity(selector.len());
    let mut brackets = 0usize;
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < selector.len() {
        let rest = &selector[i..];
        let c = match rest.chars().next() {
            Some(c) => c,
            None => break,
        };

        if quote.is_none() && brackets == 0 && c == ':' && starts_with_word(rest, ":root") {
            i += ":root".len();
            continue;
        }

        match (quote, c) {
            (Some(q), c) if q == c => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '[') => brackets += 1,
            (None, ']') => brackets = brackets.saturating_sub(1),
            _ => {}
        }
        out.push(c);
        i += c.len_utf8();
    }

    out
}

/// Collapse whitespace runs outside quotes to one space and trim.
fn collapse_whitespace(selector: &str) -> String {
    let mut out = String::with_capacity(selector.len());
    let mut quote: Option<char> = None;
    let mut pending_space = false;

    for c in selector.chars() {
        if quote.is_none() && c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;

        match (quote, c) {
            (Some(q), c) if q == c => quote = None,
            (None, '"') | (None, '\'') => quote = Some(c),
            _ => {}
        }
        out.push(c);
    }

    out
}

/// Start of every compound selector with the combinator in front of it
/// (`' '` for descendant, `None` for the first compound).
fn compound_starts(selector: &str) -> Vec<(usize, Option<char>)> {
    let mut starts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut combinator: Option<char> = None;
    let mut in_compound = false;

    for (i, c) in selector.char_indices() {
        let separator = quote.is_none() && depth == 0 && matches!(c, ' ' | '>' | '+' | '~');
        if separator {
            if c != ' ' || combinator.is_none() {
                combinator = Some(c);
            }
            in_compound = false;
            continue;
        }

        if !in_compound {
            starts.push((i, if starts.is_empty() && i == 0 { None } else { combinator }));
            combinator = None;
            in_compound = true;
        }

        match (quote, c) {
            (Some(q), c) if q == c => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '(') | (None, '[') => depth += 1,
            (None, ')') | (None, ']') => depth = depth.saturating_sub(1),
            _ => {}
        }
    }

    starts
}

/// Strip a leading name (`body`, `#container`) when it forms a whole token.
fn strip_leading_name<'a>(selector: &'a str, name: &str) -> Option<&'a str> {
    if starts_with_word(selector, name) {
        Some(&selector[name.len()..])
    } else {
        None
    }
}

/// Case-insensitive prefix match that does not run into an identifier.
fn starts_with_word(text: &str, word: &str) -> bool {
    text.len() >= word.len()
        && text.is_char_boundary(word.len())
        && text[..word.len()].eq_ignore_ascii_case(word)
        && !text[word.len()..].chars().next().map_or(false, is_ident_char)
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '-' || !c.is_ascii()
}

fn is_ident_char(c: char) -> bool {
    is_ident_start(c) || c.is_ascii_digit()
}

fn is_percentage(s: &str) -> bool {
    match s.strip_suffix('%') {
        Some(number) => {
            !number.is_empty()
                && number.chars().all(|c| c.is_ascii_digit() || c == '.')
                && number.chars().filter(|c| *c == '.').count() <= 1
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scope(selectors: &str) -> String {
        rewrite_selector_list(selectors, "rc", "test").unwrap()
    }

    #[test]
    fn test_prefix_classes_and_ids() {
        assert_eq!(scope(".one"), "#rc .testone");
        assert_eq!(scope(".three.four"), "#rc .testthree.testfour");
        assert_eq!(scope("#id1"), "#rc #testid1");
        assert_eq!(scope("#id2.class:focus"), "#rc #testid2.testclass:focus");
        assert_eq!(scope(".five:not(.test),"), "#rc .testfive:not(.testtest)");
        assert_eq!(scope("div .six"), "#rc div .testsix");
        assert_eq!(scope("p > i"), "#rc p > i");
        assert_eq!(scope("div#some"), "#rc div#testsome");
        assert_eq!(scope("li a.button"), "#rc li a.testbutton");
    }

    #[test]
    fn test_root_is_removed() {
        assert_eq!(scope(":root * "), "#rc *");
        assert_eq!(scope(":root > *"), "#rc > *");
        assert_eq!(scope(":root"), "#rc");
        assert_eq!(scope(":ROOT .a"), "#rc .testa");
        assert_eq!(scope("html:root body"), "#rc");
        assert_eq!(scope(":rooted"), "#rc :rooted");
    }

    #[test]
    fn test_sibling_combinators_stay_inside() {
        assert_eq!(scope(":root ~ p"), "#rc * ~ p");
        assert_eq!(scope("+ p"), "#rc * + p");
        assert_eq!(scope("body ~ p"), "#rc body ~ p");
        assert_eq!(
            rewrite_selector_list("#rc + div", "rc", "").unwrap(),
            "#rc #rc + div"
        );
    }

    #[test]
    fn test_body_becomes_container() {
        let scoped = |s| rewrite_selector_list(s, "rcmbody", "").unwrap();
        assert_eq!(scoped("body"), "#rcmbody");
        assert_eq!(scoped("BODY"), "#rcmbody");
        assert_eq!(scoped("body.main2cols"), "#rcmbody.main2cols");
        assert_eq!(scoped("body > p"), "#rcmbody > p");
        assert_eq!(scoped("body p, body"), "#rcmbody p, #rcmbody");
        assert_eq!(scoped("bodyx"), "#rcmbody bodyx");
    }

    #[test]
    fn test_body_after_ancestors_becomes_container() {
        let scoped = |s| rewrite_selector_list(s, "rcmbody", "").unwrap();
        assert_eq!(scoped("html body"), "#rcmbody");
        assert_eq!(scoped("html > body p"), "#rcmbody p");
        assert_eq!(scoped("HTML BODY.main > td"), "#rcmbody.main > td");
        assert_eq!(scoped("div body body i"), "#rcmbody i");
        assert_eq!(scoped("p ~ body i"), "#rcmbody p ~ body i");
        assert_eq!(scoped("html body + p"), "#rcmbody html body + p");
        assert_eq!(scoped("td[title=\"x body\"] a"), "#rcmbody td[title=\"x body\"] a");
        assert_eq!(scoped(":is(html body) p"), "#rcmbody :is(html body) p");
    }

    #[test]
    fn test_already_scoped_selectors_are_stable() {
        let scoped = |s| rewrite_selector_list(s, "rcmbody", "").unwrap();
        assert_eq!(scoped("#rcmbody .test"), "#rcmbody .test");
        assert_eq!(scoped("#rcmbody"), "#rcmbody");
        assert_eq!(scoped("#rcmbody.main2cols"), "#rcmbody.main2cols");
        assert_eq!(scoped("#rcmbodyx"), "#rcmbody #rcmbodyx");
    }

    #[test]
    fn test_attribute_and_string_content_untouched() {
        assert_eq!(
            scope(r#"a[href$=".pdf"], table[class=w600]"#),
            r#"#rc a[href$=".pdf"], #rc table[class=w600]"#
        );
        assert_eq!(scope("li:nth-child(2n+1)"), "#rc li:nth-child(2n+1)");
    }

    #[test]
    fn test_whitespace_is_normalized() {
        assert_eq!(scope("div\n  >\tp"), "#rc div > p");
        assert_eq!(
            rewrite_selector_list("h1,\n h2 ,h3", "rc", "").unwrap(),
            "#rc h1, #rc h2, #rc h3"
        );
    }

    #[test]
    fn test_no_container_only_prefixes() {
        assert_eq!(rewrite_selector_list(".a, #b", "", "x").unwrap(), ".xa, #xb");
        assert_eq!(rewrite_selector_list("body p", "", "").unwrap(), "body p");
    }

    #[test]
    fn test_hostile_selectors_rejected() {
        assert_eq!(rewrite_selector_list("a;b", "rc", ""), None);
        assert_eq!(rewrite_selector_list("</style><script>", "rc", ""), None);
        assert_eq!(rewrite_selector_list("a\\62", "rc", ""), None);
        assert_eq!(rewrite_selector_list(" , ", "rc", ""), None);
        assert!(rewrite_selector_list(".café", "rc", "").is_some());
    }

    #[test]
    fn test_keyframe_selectors() {
        assert_eq!(keyframe_selector_list("FROM"), Some("from".to_string()));
        assert_eq!(keyframe_selector_list("0%, 50.5% ,to"), Some("0%, 50.5%, to".to_string()));
        assert_eq!(keyframe_selector_list("body"), None);
        assert_eq!(keyframe_selector_list("1.2.3%"), None);
    }

    #[test]
    fn test_split_respects_nesting() {
        assert_eq!(
            split_selector_list(r#":is(a, b), c[x="1,2"]"#),
            vec![":is(a, b)", r#" c[x="1,2"]"#]
        );
    }
}
