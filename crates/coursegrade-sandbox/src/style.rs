//! Computed-style resolution over a parsed document.

use scraper::{ElementRef, Selector};

use crate::color;
use crate::stylesheet::{self, Declaration, Specificity, StyleRule};

/// Where a declaration came from. Later variants win at equal importance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Origin {
    UserAgent,
    Author,
    Inline,
}

#[derive(Debug)]
struct CompiledRule {
    selector: Selector,
    specificity: Specificity,
    origin: Origin,
    /// Position in the concatenated style sources.
    order: usize,
    declarations: Vec<Declaration>,
}

/// Cascade rank of a declaration: importance, origin, specificity, order.
type Rank = (bool, Origin, Specificity, usize);

/// Resolves `getComputedStyle`-like values for elements of one document.
#[derive(Debug)]
pub struct StyleResolver {
    rules: Vec<CompiledRule>,
}

const INHERITED: &[&str] = &[
    "color",
    "cursor",
    "direction",
    "font",
    "font-family",
    "font-size",
    "font-style",
    "font-variant",
    "font-weight",
    "letter-spacing",
    "line-height",
    "list-style",
    "list-style-position",
    "list-style-type",
    "text-align",
    "text-indent",
    "text-transform",
    "visibility",
    "white-space",
    "word-spacing",
];

const INITIAL: &[(&str, &str)] = &[
    ("background-color", "rgba(0, 0, 0, 0)"),
    ("border-bottom-style", "none"),
    ("border-bottom-width", "0px"),
    ("border-left-style", "none"),
    ("border-left-width", "0px"),
    ("border-right-style", "none"),
    ("border-right-width", "0px"),
    ("border-style", "none"),
    ("border-top-style", "none"),
    ("border-top-width", "0px"),
    ("border-width", "0px"),
    ("bottom", "auto"),
    ("color", "rgb(0, 0, 0)"),
    ("cursor", "auto"),
    ("direction", "ltr"),
    ("display", "inline"),
    ("float", "none"),
    ("font-size", "16px"),
    ("font-style", "normal"),
    ("font-variant", "normal"),
    ("font-weight", "400"),
    ("height", "auto"),
    ("left", "auto"),
    ("letter-spacing", "normal"),
    ("line-height", "normal"),
    ("list-style-position", "outside"),
    ("list-style-type", "disc"),
    ("margin-bottom", "0px"),
    ("margin-left", "0px"),
    ("margin-right", "0px"),
    ("margin-top", "0px"),
    ("opacity", "1"),
    ("overflow", "visible"),
    ("padding-bottom", "0px"),
    ("padding-left", "0px"),
    ("padding-right", "0px"),
    ("padding-top", "0px"),
    ("position", "static"),
    ("right", "auto"),
    ("text-align", "start"),
    ("text-decoration", "none"),
    ("text-indent", "0px"),
    ("text-transform", "none"),
    ("top", "auto"),
    ("visibility", "visible"),
    ("white-space", "normal"),
    ("width", "auto"),
    ("word-spacing", "0px"),
    ("z-index", "auto"),
];

/// Properties whose computed value is an absolute length.
const LENGTH_PROPERTIES: &[&str] = &[
    "border-bottom-width",
    "border-left-width",
    "border-right-width",
    "border-top-width",
    "bottom",
    "height",
    "left",
    "letter-spacing",
    "line-height",
    "margin-bottom",
    "margin-left",
    "margin-right",
    "margin-top",
    "max-height",
    "max-width",
    "min-height",
    "min-width",
    "outline-width",
    "padding-bottom",
    "padding-left",
    "padding-right",
    "padding-top",
    "right",
    "text-indent",
    "top",
    "width",
    "word-spacing",
];

/// Font size of the initial containing block, in px.
const MEDIUM_FONT_PX: f64 = 16.0;

fn is_inherited(property: &str) -> bool {
    INHERITED.contains(&property)
}

fn is_color_property(property: &str) -> bool {
    property == "color" || property.ends_with("-color")
}

fn initial_value(property: &str) -> String {
    if property.starts_with("border-") && property.ends_with("-color") {
        return "currentcolor".to_string();
    }
    INITIAL
        .iter()
        .find(|(name, _)| *name == property)
        .map(|(_, value)| value.to_string())
        .unwrap_or_default()
}

/// A cascaded value after CSS-wide keywords are applied.
enum Specified {
    Inherit,
    Initial,
    Value(String),
}

impl Specified {
    fn resolve(cascaded: Option<String>, property: &str) -> Self {
        let Some(value) = cascaded else {
            return if is_inherited(property) {
                Specified::Inherit
            } else {
                Specified::Initial
            };
        };
        match value.to_ascii_lowercase().as_str() {
            "inherit" => Specified::Inherit,
            "initial" => Specified::Initial,
            "unset" if is_inherited(property) => Specified::Inherit,
            "unset" => Specified::Initial,
            _ => Specified::Value(value),
        }
    }
}

/// Computed values one element hands down to its children.
#[derive(Debug, Clone)]
struct Computed {
    color: String,
    font_size: f64,
    /// Computed value of the requested property.
    value: String,
}

/// Format a px length the way browsers serialize it.
fn format_px(px: f64) -> String {
    let mut text = format!("{:.3}", (px * 1000.0).round() / 1000.0);
    while text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.pop();
    }
    if text == "-0" {
        text = "0".to_string();
    }
    format!("{text}px")
}

/// Absolute size in px of a length, if `value` is one.
///
/// `em` resolves against `font_size`, `rem` against `root_font_size`.
/// Percentages and `calc()` are not lengths here.
fn length_to_px(value: &str, font_size: f64, root_font_size: f64) -> Option<f64> {
    let value = value.trim().to_ascii_lowercase();
    let split = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);
    let number: f64 = number.parse().ok()?;

    let factor = match unit {
        "" if number == 0.0 => 0.0,
        "px" => 1.0,
        "em" => font_size,
        "rem" => root_font_size,
        "pt" => 96.0 / 72.0,
        "pc" => 16.0,
        "in" => 96.0,
        "cm" => 96.0 / 2.54,
        "mm" => 96.0 / 25.4,
        "q" => 96.0 / 101.6,
        _ => return None,
    };
    Some(number * factor)
}

fn font_size_px(value: &str, parent: f64, root: f64) -> Option<f64> {
    let keyword = value.trim().to_ascii_lowercase();
    let px = match keyword.as_str() {
        "xx-small" => 9.0,
        "x-small" => 10.0,
        "small" => 13.0,
        "medium" => MEDIUM_FONT_PX,
        "large" => 18.0,
        "x-large" => 24.0,
        "xx-large" => 32.0,
        "xxx-large" => 48.0,
        "smaller" => parent / 1.2,
        "larger" => parent * 1.2,
        _ => match keyword.strip_suffix('%') {
            Some(percent) => parent * percent.trim().parse::<f64>().ok()? / 100.0,
            None => length_to_px(&keyword, parent, root)?,
        },
    };
    Some(px)
}

fn font_weight(keyword: &str, parent: u32) -> String {
    let weight = match keyword {
        "normal" => 400,
        "bold" => 700,
        "bolder" => match parent {
            w if w < 350 => 400,
            w if w < 550 => 700,
            _ => 900,
        },
        "lighter" => match parent {
            w if w < 550 => 100,
            w if w < 750 => 400,
            _ => 700,
        },
        other => return other.to_string(),
    };
    weight.to_string()
}

fn border_width_keyword(value: &str) -> Option<&'static str> {
    match value.trim().to_ascii_lowercase().as_str() {
        "thin" => Some("1px"),
        "medium" => Some("3px"),
        "thick" => Some("5px"),
        _ => None,
    }
}

impl StyleResolver {
    /// Build a resolver from author style sources in cascade order. The
    /// user-agent stylesheet is ranked below all of them.
    pub fn new<'a>(sources: impl IntoIterator<Item = &'a str>) -> Self {
        let mut rules = Vec::new();
        let mut order = 0;
        let mut add = |origin: Origin, parsed: Vec<StyleRule>| {
            for rule in parsed {
                for (selector, specificity) in rule.selectors {
                    rules.push(CompiledRule {
                        selector,
                        specificity,
                        origin,
                        order,
                        declarations: rule.declarations.clone(),
                    });
                }
                order += 1;
            }
        };

        add(
            Origin::UserAgent,
            stylesheet::parse_stylesheet(stylesheet::USER_AGENT_STYLESHEET),
        );
        for source in sources {
            add(Origin::Author, stylesheet::parse_stylesheet(source));
        }

        Self { rules }
    }

    /// Number of compiled selector rules, user-agent rules included.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// The computed value of `property` for `element`.
    ///
    /// Values are resolved from the root element down, one ancestor at a
    /// time, so document depth costs heap rather than stack. Unknown,
    /// undeclared, non-inherited properties compute to an empty string.
    pub fn computed_value(&self, element: ElementRef<'_>, property: &str) -> String {
        let property = property.trim().to_ascii_lowercase();

        let mut chain: Vec<ElementRef<'_>> =
            element.ancestors().filter_map(ElementRef::wrap).collect();
        chain.reverse();
        chain.push(element);

        let mut root_font_size = None;
        let mut parent: Option<Computed> = None;
        for el in chain {
            let root = root_font_size.unwrap_or(MEDIUM_FONT_PX);
            let computed = self.compute_node(el, &property, parent.as_ref(), root);
            root_font_size.get_or_insert(computed.font_size);
            parent = Some(computed);
        }

        parent.map(|c| c.value).unwrap_or_default()
    }

    fn compute_node(
        &self,
        element: ElementRef<'_>,
        property: &str,
        parent: Option<&Computed>,
        root_font_size: f64,
    ) -> Computed {
        let parent_font_size = parent.map_or(MEDIUM_FONT_PX, |p| p.font_size);

        let cascaded = self.cascaded_value(element, "font-size");
        let font_size = match Specified::resolve(cascaded, "font-size") {
            Specified::Inherit => parent_font_size,
            Specified::Initial => MEDIUM_FONT_PX,
            Specified::Value(v) => {
                font_size_px(&v, parent_font_size, root_font_size).unwrap_or(parent_font_size)
            }
        };

        let inherited_color = || {
            parent
                .map(|p| p.color.clone())
                .unwrap_or_else(|| initial_value("color"))
        };
        let cascaded = self.cascaded_value(element, "color");
        let color = match Specified::resolve(cascaded, "color") {
            Specified::Inherit => inherited_color(),
            Specified::Initial => initial_value("color"),
            Specified::Value(v) if v.eq_ignore_ascii_case("currentcolor") => inherited_color(),
            Specified::Value(v) => color::canonicalize(&v),
        };

        let value = match property {
            "color" => color.clone(),
            "font-size" => format_px(font_size),
            _ => {
                let specified = Specified::resolve(self.cascaded_value(element, property), property);
                self.compute_value(property, specified, parent, &color, font_size, root_font_size)
            }
        };

        Computed {
            color,
            font_size,
            value,
        }
    }

    fn compute_value(
        &self,
        property: &str,
        specified: Specified,
        parent: Option<&Computed>,
        color: &str,
        font_size: f64,
        root_font_size: f64,
    ) -> String {
        let initial = || match initial_value(property) {
            v if v == "currentcolor" => color.to_string(),
            v => v,
        };
        let value = match specified {
            Specified::Inherit => return parent.map(|p| p.value.clone()).unwrap_or_else(initial),
            Specified::Initial => return initial(),
            Specified::Value(value) => value,
        };

        if value.eq_ignore_ascii_case("currentcolor") {
            return color.to_string();
        }
        if is_color_property(property) {
            return color::canonicalize(&value);
        }
        if property == "font-weight" {
            let parent_weight = parent
                .and_then(|p| p.value.parse::<u32>().ok())
                .unwrap_or(400);
            return font_weight(&value.to_ascii_lowercase(), parent_weight);
        }
        if LENGTH_PROPERTIES.contains(&property) {
            if property.starts_with("border-") {
                if let Some(px) = border_width_keyword(&value) {
                    return px.to_string();
                }
            }
            if let Some(px) = length_to_px(&value, font_size, root_font_size) {
                return format_px(px);
            }
        }
        value
    }

    /// The winning declared value for `property` on `element`, if any.
    fn cascaded_value(&self, element: ElementRef<'_>, property: &str) -> Option<String> {
        let inline = element
            .value()
            .attr("style")
            .map(stylesheet::parse_declarations)
            .unwrap_or_default();

        let mut candidates: Vec<(Rank, &str)> = Vec::new();
        for rule in &self.rules {
            if !rule.selector.matches(&element) {
                continue;
            }
            for decl in rule.declarations.iter().filter(|d| d.property == property) {
                candidates.push((
                    (decl.important, rule.origin, rule.specificity, rule.order),
                    decl.value.as_str(),
                ));
            }
        }
        for (i, decl) in inline.iter().enumerate() {
            if decl.property == property {
                candidates.push((
                    (decl.important, Origin::Inline, (0, 0, 0), i),
                    decl.value.as_str(),
                ));
            }
        }

        // Later declarations win ties.
        candidates
            .into_iter()
            .max_by(|a, b| a.0.cmp(&b.0))
            .map(|(_, value)| value.to_string())
    }
}
