//! Minimal CSS stylesheet parser.
//!
//! Handles what exercise submissions contain: rule sets with selector
//! lists, `!important`, comments, and the common shorthands. At-rules are
//! skipped; the sandbox has no viewport to evaluate media queries against.

use scraper::Selector;

use crate::color;

/// Selector specificity as `(ids, classes, types)`.
pub type Specificity = (u32, u32, u32);

/// One `property: value` pair after shorthand expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub property: String,
    pub value: String,
    pub important: bool,
}

/// A parsed rule set. Each selector of the list keeps its own specificity.
#[derive(Debug, Clone)]
pub struct StyleRule {
    pub selectors: Vec<(Selector, Specificity)>,
    pub declarations: Vec<Declaration>,
}

/// Default styles for elements, ranked below every author rule.
pub const USER_AGENT_STYLESHEET: &str = r#"
html, body, address, article, aside, blockquote, dd, details, div, dl, dt,
fieldset, figcaption, figure, footer, form, h1, h2, h3, h4, h5, h6, header,
hgroup, hr, main, nav, ol, p, pre, section, summary, ul { display: block }
li { display: list-item }
table { display: table }
tr { display: table-row }
td, th { display: table-cell }
head, script, style, title, meta, link, template, [hidden] { display: none }
body { margin: 8px }
p, blockquote, ul, ol, dl, figure, pre { margin-top: 1em; margin-bottom: 1em }
ul, ol { padding-left: 40px }
h1 { font-size: 2em; font-weight: bold; margin-top: 0.67em; margin-bottom: 0.67em }
h2 { font-size: 1.5em; font-weight: bold; margin-top: 0.83em; margin-bottom: 0.83em }
h3 { font-size: 1.17em; font-weight: bold; margin-top: 1em; margin-bottom: 1em }
h4 { font-size: 1em; font-weight: bold; margin-top: 1.33em; margin-bottom: 1.33em }
h5 { font-size: 0.83em; font-weight: bold; margin-top: 1.67em; margin-bottom: 1.67em }
h6 { font-size: 0.67em; font-weight: bold; margin-top: 2.33em; margin-bottom: 2.33em }
b, strong, th { font-weight: bold }
i, em, cite, var, address { font-style: italic }
pre, code, kbd, samp { font-family: monospace }
a { color: #0000ee; text-decoration: underline; cursor: pointer }
u, ins { text-decoration: underline }
s, del { text-decoration: line-through }
th { text-align: center }
center { text-align: center; display: block }
"#;

/// Parse a stylesheet. Rules whose selector list does not parse are
/// dropped, as browsers do.
pub fn parse_stylesheet(css: &str) -> Vec<StyleRule> {
    let css = strip_comments(css);
    let mut rules = Vec::new();
    let mut rest = css.as_str();

    while let Some(open) = rest.find('{') {
        let prelude = rest[..open].trim();

        // Statement at-rules (`@import ...;`) end before the next block.
        let prelude = match prelude.rfind(';') {
            Some(semi) if prelude.starts_with('@') => prelude[semi + 1..].trim(),
            _ => prelude,
        };

        let close = matching_brace(rest, open);
        let body = &rest[open + 1..close];
        rest = rest.get(close + 1..).unwrap_or("");

        if prelude.starts_with('@') {
            tracing::debug!(rule = prelude, "skipping at-rule");
            continue;
        }

        match parse_selector_list(prelude) {
            Some(selectors) => rules.push(StyleRule {
                selectors,
                declarations: parse_declarations(body),
            }),
            None => tracing::debug!(selector = prelude, "dropping rule with invalid selector"),
        }
    }

    rules
}

/// Parse a declaration block, e.g. the contents of a `style` attribute.
pub fn parse_declarations(block: &str) -> Vec<Declaration> {
    split_top_level(block, ';')
        .into_iter()
        .filter_map(|decl| {
            let (property, value) = decl.split_once(':')?;
            let property = property.trim().to_ascii_lowercase();
            if property.is_empty() {
                return None;
            }
            let (value, important) = strip_important(value.trim());
            if value.is_empty() {
                return None;
            }
            Some(expand_shorthand(&property, value, important))
        })
        .flatten()
        .collect()
}

/// Specificity of a single complex selector, counted from its text.
pub fn specificity(selector: &str) -> Specificity {
    let chars: Vec<char> = selector.chars().collect();
    let (mut a, mut b, mut c) = (0, 0, 0);
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '#' => {
                a += 1;
                i = skip_ident(&chars, i + 1);
            }
            '.' => {
                b += 1;
                i = skip_ident(&chars, i + 1);
            }
            '[' => {
                b += 1;
                while i < chars.len() && chars[i] != ']' {
                    i += 1;
                }
                i += 1;
            }
            ':' if chars.get(i + 1) == Some(&':') => {
                c += 1;
                i = skip_ident(&chars, i + 2);
                i = skip_parens(&chars, i).1;
            }
            ':' => {
                let start = i + 1;
                i = skip_ident(&chars, start);
                let name: String = chars[start..i].iter().collect::<String>().to_ascii_lowercase();
                let (args, end) = skip_parens(&chars, i);
                i = end;
                match name.as_str() {
                    "where" => {}
                    "is" | "not" | "has" | "matches" => {
                        let inner = split_top_level(&args, ',')
                            .iter()
                            .map(|s| specificity(s))
                            .max()
                            .unwrap_or_default();
                        a += inner.0;
                        b += inner.1;
                        c += inner.2;
                    }
                    _ => b += 1,
                }
            }
            ch if is_ident_start(ch) => {
                c += 1;
                i = skip_ident(&chars, i);
            }
            _ => i += 1,
        }
    }

    (a, b, c)
}

fn parse_selector_list(prelude: &str) -> Option<Vec<(Selector, Specificity)>> {
    if prelude.is_empty() {
        return None;
    }
    split_top_level(prelude, ',')
        .into_iter()
        .map(|text| {
            let selector = Selector::parse(&text).ok()?;
            Some((selector, specificity(&text)))
        })
        .collect()
}

/// Longhand declarations for a property, plus the property itself.
fn expand_shorthand(property: &str, value: &str, important: bool) -> Vec<Declaration> {
    let decl = |property: String, value: String| Declaration {
        property,
        value,
        important,
    };
    let mut out = vec![decl(property.to_string(), value.to_string())];

    match property {
        "margin" | "padding" => {
            if let Some([top, right, bottom, left]) = box_sides(value) {
                for (side, v) in [("top", top), ("right", right), ("bottom", bottom), ("left", left)] {
                    out.push(decl(format!("{property}-{side}"), v));
                }
            }
        }
        "background" => {
            let color = split_top_level(value, ' ')
                .into_iter()
                .rev()
                .find(|token| is_color_token(token))
                .unwrap_or_else(|| "transparent".to_string());
            out.push(decl("background-color".into(), color));
        }
        "border" | "border-top" | "border-right" | "border-bottom" | "border-left" => {
            let mut width = "medium".to_string();
            let mut style = "none".to_string();
            let mut color = "currentcolor".to_string();
            for token in split_top_level(value, ' ') {
                if BORDER_STYLES.contains(&token.to_ascii_lowercase().as_str()) {
                    style = token;
                } else if is_color_token(&token) {
                    color = token;
                } else {
                    width = token;
                }
            }
            let sides = match property.strip_prefix("border-") {
                Some(side) => vec![side],
                None => vec!["top", "right", "bottom", "left"],
            };
            for side in sides {
                out.push(decl(format!("border-{side}-width"), width.clone()));
                out.push(decl(format!("border-{side}-style"), style.clone()));
                out.push(decl(format!("border-{side}-color"), color.clone()));
            }
            if property == "border" {
                out.push(decl("border-width".into(), width));
                out.push(decl("border-style".into(), style));
                out.push(decl("border-color".into(), color));
            }
        }
        "border-color" | "border-style" | "border-width" => {
            let kind = &property["border-".len()..];
            if let Some([top, right, bottom, left]) = box_sides(value) {
                for (side, v) in [("top", top), ("right", right), ("bottom", bottom), ("left", left)] {
                    out.push(decl(format!("border-{side}-{kind}"), v));
                }
            }
        }
        _ => {}
    }

    out
}

const BORDER_STYLES: &[&str] = &[
    "none", "hidden", "dotted", "dashed", "solid", "double", "groove", "ridge", "inset", "outset",
];

fn is_color_token(token: &str) -> bool {
    token.eq_ignore_ascii_case("currentcolor") || color::parse_color(token).is_some()
}

/// Expand the 1–4 value box syntax into top, right, bottom, left.
fn box_sides(value: &str) -> Option<[String; 4]> {
    let parts = split_top_level(value, ' ');
    let [top, right, bottom, left] = match parts.as_slice() {
        [all] => [all, all, all, all],
        [vertical, horizontal] => [vertical, horizontal, vertical, horizontal],
        [top, horizontal, bottom] => [top, horizontal, bottom, horizontal],
        [top, right, bottom, left] => [top, right, bottom, left],
        _ => return None,
    };
    Some([top.clone(), right.clone(), bottom.clone(), left.clone()])
}

fn strip_important(value: &str) -> (&str, bool) {
    if let Some(bang) = value.rfind('!') {
        if value[bang + 1..].trim().eq_ignore_ascii_case("important") {
            return (value[..bang].trim(), true);
        }
    }
    (value, false)
}

fn strip_comments(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
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

/// Index of the `}` closing the `{` at `open`, or the end of input.
fn matching_brace(text: &str, open: usize) -> usize {
    let mut depth = 0usize;
    for (i, ch) in text[open..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return open + i;
                }
            }
            _ => {}
        }
    }
    text.len()
}

/// Split on `sep` outside of parentheses, brackets and quotes. Empty
/// pieces are dropped; pieces are trimmed.
fn split_top_level(text: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;

    for ch in text.chars() {
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                }
                current.push(ch);
                continue;
            }
            None if ch == '"' || ch == '\'' => quote = Some(ch),
            None => {}
        }
        let at_sep = if sep == ' ' { ch.is_whitespace() } else { ch == sep };
        match ch {
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            _ if at_sep && depth == 0 => {
                let piece = current.trim();
                if !piece.is_empty() {
                    parts.push(piece.to_string());
                }
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }
    let piece = current.trim();
    if !piece.is_empty() {
        parts.push(piece.to_string());
    }
    parts
}

fn is_ident_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || ch == '-'
}

fn skip_ident(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '-' || chars[i] == '_') {
        i += 1;
    }
    i
}

/// If a parenthesized argument starts at `i`, return it and the index past it.
fn skip_parens(chars: &[char], i: usize) -> (String, usize) {
    if chars.get(i) != Some(&'(') {
        return (String::new(), i);
    }
    let mut depth = 0;
    for (offset, ch) in chars[i..].iter().enumerate() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    let args = chars[i + 1..i + offset].iter().collect();
                    return (args, i + offset + 1);
                }
            }
            _ => {}
        }
    }
    (chars[i + 1..].iter().collect(), chars.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(decls: &[Declaration]) -> Vec<(&str, &str)> {
        decls
            .iter()
            .map(|d| (d.property.as_str(), d.value.as_str()))
            .collect()
    }

    #[test]
    fn parses_rules_and_comments() {
        let rules = parse_stylesheet(
            "/* title */ h1, .lead { color: red; font-size: 20px } /* end */ p{margin:0}",
        );
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].selectors.len(), 2);
        assert_eq!(
            props(&rules[0].declarations),
            vec![("color", "red"), ("font-size", "20px")]
        );
        assert_eq!(rules[1].declarations[0].property, "margin");
    }

    #[test]
    fn skips_at_rules_and_invalid_selectors() {
        let rules = parse_stylesheet(
            "@import url('x.css'); @media (max-width: 600px) { h1 { color: blue } } \
             h1 >>> p { color: green } h2 { color: red }",
        );
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].declarations[0].value, "red");
    }

    #[test]
    fn important_is_recognised() {
        let decls = parse_declarations("color: red !important; background: url(a;b.png) blue");
        assert!(decls[0].important);
        assert_eq!(decls[0].value, "red");
        assert!(decls
            .iter()
            .any(|d| d.property == "background-color" && d.value == "blue" && !d.important));
    }

    #[test]
    fn box_shorthands_expand() {
        let decls = parse_declarations("margin: 1px 2px 3px; padding: 4px");
        let props = props(&decls);
        assert!(props.contains(&("margin-top", "1px")));
        assert!(props.contains(&("margin-right", "2px")));
        assert!(props.contains(&("margin-bottom", "3px")));
        assert!(props.contains(&("margin-left", "2px")));
        assert!(props.contains(&("padding-left", "4px")));
    }

    #[test]
    fn border_shorthand_expands() {
        let decls = parse_declarations("border: 2px solid #333");
        let props = props(&decls);
        assert!(props.contains(&("border-top-color", "#333")));
        assert!(props.contains(&("border-left-style", "solid")));
        assert!(props.contains(&("border-width", "2px")));
    }

    #[test]
    fn background_without_colour_resets_it() {
        let decls = parse_declarations("background: url(bg.png) no-repeat");
        assert!(decls
            .iter()
            .any(|d| d.property == "background-color" && d.value == "transparent"));
    }

    #[test]
    fn specificity_counts() {
        assert_eq!(specificity("h1"), (0, 0, 1));
        assert_eq!(specificity("#main .item > a:hover"), (1, 2, 1));
        assert_eq!(specificity("ul li[data-x='1']::before"), (0, 1, 3));
        assert_eq!(specificity("*"), (0, 0, 0));
        assert_eq!(specificity(":not(#a, .b) p"), (1, 0, 1));
        assert_eq!(specificity(":where(#a) p"), (0, 0, 1));
    }

    #[test]
    fn user_agent_stylesheet_parses() {
        let rules = parse_stylesheet(USER_AGENT_STYLESHEET);
        assert!(rules.len() > 20);
    }
}
