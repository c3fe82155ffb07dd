//! Stylesheet mapping onto a platform-neutral style model.
//!
//! This is deliberately not a CSS engine. Rules are keyed by a single class
//! (or bare tag) name, property names are converted to camelCase and values
//! to [`StyleValue`]s. Unsupported syntax is skipped, never fatal.

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

use crate::error::{Diagnostic, Diagnostics};

/// Root font size used to resolve `rem`/`em` when nothing else is configured.
pub const DEFAULT_BASE_FONT_SIZE: f32 = 16.0;

const VENDOR_PREFIXES: [&str; 4] = ["-webkit-", "-moz-", "-ms-", "-o-"];
const KEYWORDS: [&str; 4] = ["bold", "normal", "italic", "none"];

/// A converted declaration value.
#[derive(Clone, Debug, PartialEq)]
pub enum StyleValue {
    /// Absolute size in pixels (`px`, unitless, or `rem`/`em` scaled by the
    /// base font size).
    Number(f32),
    /// Relative size as a fraction (`50%` -> `0.5`; also `vw`/`vh`).
    Fraction(f32),
    /// Lower-cased keyword (`bold`, `italic`, ...).
    Keyword(String),
    /// Anything else, passed through trimmed (colors, font stacks).
    Raw(String),
}

impl StyleValue {
    /// Numeric value for `Number`.
    pub fn as_number(&self) -> Option<f32> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Keyword text, if this is a keyword.
    pub fn as_keyword(&self) -> Option<&str> {
        match self {
            Self::Keyword(k) => Some(k),
            _ => None,
        }
    }
}

impl fmt::Display for StyleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Fraction(n) => write!(f, "{}%", n * 100.0),
            Self::Keyword(s) | Self::Raw(s) => f.write_str(s),
        }
    }
}

/// Ordered property -> value map keyed by camelCase property names.
///
/// Setting an existing property replaces its value in place, so iteration
/// order is first-declaration order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StyleMap {
    entries: Vec<(String, StyleValue)>,
}

impl StyleMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `property`, replacing any earlier value.
    pub fn set(&mut self, property: impl Into<String>, value: StyleValue) {
        let property = property.into();
        match self.entries.iter_mut().find(|(name, _)| *name == property) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((property, value)),
        }
    }

    /// Builder-style [`StyleMap::set`].
    pub fn with(mut self, property: impl Into<String>, value: StyleValue) -> Self {
        self.set(property, value);
        self
    }

    /// Value for `property`.
    pub fn get(&self, property: &str) -> Option<&StyleValue> {
        self.entries
            .iter()
            .find(|(name, _)| name == property)
            .map(|(_, value)| value)
    }

    /// Overlay `other` on top of this map (`other` wins).
    pub fn merge(&mut self, other: &StyleMap) {
        for (property, value) in &other.entries {
            self.set(property.clone(), value.clone());
        }
    }

    /// Entries in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &StyleValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no properties are set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One parsed rule: a selector and its converted declarations.
#[derive(Clone, Debug, PartialEq)]
pub struct CssRule {
    /// Selector as written (one entry of a comma list).
    pub selector: String,
    /// Converted declarations.
    pub declarations: StyleMap,
}

/// Result of [`parse_css`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CssParse {
    /// Rules in source order.
    pub rules: Vec<CssRule>,
    /// Skipped declarations.
    pub diagnostics: Diagnostics,
}

/// Strip vendor prefixes and convert kebab-case to camelCase.
///
/// `-webkit-font-size` -> `fontSize`.
pub fn convert_property_name(name: &str) -> String {
    let mut name = name.trim();
    for prefix in VENDOR_PREFIXES {
        if let Some(rest) = name.strip_prefix(prefix) {
            name = rest;
            break;
        }
    }
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for ch in name.chars() {
        if ch == '-' {
            upper_next = !out.is_empty();
            continue;
        }
        if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// Numeric part of a length in pixels (or as a fraction for `%`/`vw`/`vh`),
/// using [`DEFAULT_BASE_FONT_SIZE`] for `rem`/`em`.
///
/// `"2rem"` -> `32`, `"50%"` -> `0.5`, `"10px"` -> `10`, `"abc"` -> `None`.
pub fn convert_unit(value: &str) -> Option<f32> {
    convert_unit_with(value, DEFAULT_BASE_FONT_SIZE)
}

/// [`convert_unit`] with an explicit base font size.
pub fn convert_unit_with(value: &str, base_font_size: f32) -> Option<f32> {
    parse_length(value, base_font_size).map(|value| match value {
        StyleValue::Number(n) | StyleValue::Fraction(n) => n,
        _ => 0.0,
    })
}

/// Convert one declaration value for `property`.
pub fn convert_property_value(property: &str, value: &str) -> StyleValue {
    convert_property_value_with(property, value, DEFAULT_BASE_FONT_SIZE)
}

/// [`convert_property_value`] with an explicit base font size.
pub fn convert_property_value_with(property: &str, value: &str, base_font_size: f32) -> StyleValue {
    let value = value.trim();
    if property.to_ascii_lowercase().contains("color") {
        return StyleValue::Raw(value.to_string());
    }
    if let Some(keyword) = KEYWORDS.iter().find(|k| k.eq_ignore_ascii_case(value)) {
        return StyleValue::Keyword((*keyword).to_string());
    }
    parse_length(value, base_font_size).unwrap_or_else(|| StyleValue::Raw(value.to_string()))
}

/// `^-?\d*\.?\d+(px|rem|em|%|vw|vh)?$`
fn parse_length(value: &str, base_font_size: f32) -> Option<StyleValue> {
    let value = value.trim();
    let split = value
        .char_indices()
        .find(|&(idx, ch)| !(ch.is_ascii_digit() || ch == '.' || (ch == '-' && idx == 0)))
        .map(|(idx, _)| idx)
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);
    if !number.bytes().any(|b| b.is_ascii_digit()) || number.ends_with('.') {
        return None;
    }
    let n: f32 = number.parse().ok()?;
    match unit.to_ascii_lowercase().as_str() {
        "" | "px" => Some(StyleValue::Number(n)),
        "rem" | "em" => Some(StyleValue::Number(n * base_font_size)),
        "%" | "vw" | "vh" => Some(StyleValue::Fraction(n / 100.0)),
        _ => None,
    }
}

/// Parse stylesheet text into rules.
pub fn parse_css(text: &str) -> CssParse {
    parse_css_with(text, DEFAULT_BASE_FONT_SIZE)
}

/// [`parse_css`] with an explicit base font size.
pub fn parse_css_with(text: &str, base_font_size: f32) -> CssParse {
    let cleaned = strip_comments(text);
    let mut out = CssParse::default();
    let mut rest = cleaned.as_str();

    while let Some(open) = rest.find('{') {
        // statement at-rules (`@charset "x";`, `@import ...;`) end at ';'
        let prefix = &rest[..open];
        let selector_text = match prefix.rfind(';') {
            Some(semi) => prefix[semi + 1..].trim(),
            None => prefix.trim(),
        };
        let after_open = &rest[open + 1..];
        if selector_text.starts_with('@') {
            // at-rule blocks may nest one level (`@media { p { } }`)
            rest = skip_block(after_open);
            log::debug!("skipped at-rule {}", selector_text);
            continue;
        }
        let close = after_open.find('}').unwrap_or(after_open.len());
        let body = &after_open[..close];
        rest = after_open.get(close + 1..).unwrap_or("");

        let declarations =
            parse_declarations(body, selector_text, base_font_size, &mut out.diagnostics);
        if declarations.is_empty() {
            continue;
        }
        for selector in selector_text.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            out.rules.push(CssRule {
                selector: selector.to_string(),
                declarations: declarations.clone(),
            });
        }
    }
    out
}

/// Parse a `style="..."` attribute value.
pub fn parse_inline_style(text: &str) -> (StyleMap, Diagnostics) {
    parse_inline_style_with(text, DEFAULT_BASE_FONT_SIZE)
}

/// [`parse_inline_style`] with an explicit base font size.
pub fn parse_inline_style_with(text: &str, base_font_size: f32) -> (StyleMap, Diagnostics) {
    let mut diagnostics = Diagnostics::new();
    let styles = parse_declarations(text, "style attribute", base_font_size, &mut diagnostics);
    (styles, diagnostics)
}

fn parse_declarations(
    body: &str,
    source: &str,
    base_font_size: f32,
    diagnostics: &mut Diagnostics,
) -> StyleMap {
    let mut map = StyleMap::new();
    for declaration in body.split(';') {
        let declaration = declaration.trim();
        if declaration.is_empty() {
            continue;
        }
        let reject = |reason: &'static str| Diagnostic::MalformedStyleDeclaration {
            source: source.to_string(),
            declaration: declaration.to_string(),
            reason,
        };
        let Some((property, value)) = declaration.split_once(':') else {
            diagnostics.push(reject("missing ':'"));
            continue;
        };
        let property = property.trim();
        let value = strip_important(value.trim());
        if property.is_empty() || value.is_empty() {
            diagnostics.push(reject("empty property or value"));
            continue;
        }
        if property.contains('@') || property.contains('$') {
            diagnostics.push(reject("unsupported property name"));
            continue;
        }
        let name = convert_property_name(property);
        let converted = convert_property_value_with(&name, value, base_font_size);
        map.set(name, converted);
    }
    map
}

fn strip_important(value: &str) -> &str {
    match value.to_ascii_lowercase().rfind("!important") {
        Some(idx) => value[..idx].trim_end(),
        None => value,
    }
}

fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Skip past the block whose `{` was just consumed, honoring nesting.
fn skip_block(text: &str) -> &str {
    let mut depth = 1usize;
    for (idx, ch) in text.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return &text[idx + 1..];
                }
            }
            _ => {}
        }
    }
    ""
}

/// What a simple selector applies to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectorKey {
    /// `.note`, `p.note`, `.note em` -> `note`
    Class(String),
    /// `p`, `h1 em` -> `p`, `h1`
    Tag(String),
}

/// Reduce a selector to the key it is stored under.
///
/// Only the first whitespace-delimited token counts. Id, universal and
/// attribute selectors have no key.
pub fn selector_key(selector: &str) -> Option<SelectorKey> {
    let token = selector.split_whitespace().next()?;
    let token = token.split([':', '[', '>', '+', '~']).next().unwrap_or("");
    if let Some(idx) = token.find('.') {
        let class = token[idx + 1..].split(['.', '#']).next().unwrap_or("");
        return (!class.is_empty()).then(|| SelectorKey::Class(class.to_string()));
    }
    let is_tag = !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    is_tag.then(|| SelectorKey::Tag(token.to_ascii_lowercase()))
}

/// Class (and bare tag) styles gathered from stylesheets.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StyleSheet {
    classes: BTreeMap<String, StyleMap>,
    tags: BTreeMap<String, StyleMap>,
}

impl StyleSheet {
    /// Create an empty sheet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a sheet from parsed rules.
    pub fn from_rules(rules: &[CssRule]) -> Self {
        let mut sheet = Self::new();
        sheet.add_rules(rules);
        sheet
    }

    /// Parse `css` and build a sheet from it. Diagnostics are tagged with
    /// `source`.
    pub fn parse(css: &str, source: &str, base_font_size: f32) -> (Self, Diagnostics) {
        let parsed = parse_css_with(css, base_font_size);
        let mut diagnostics = Diagnostics::new();
        for diag in parsed.diagnostics {
            diagnostics.push(retag(diag, source));
        }
        (Self::from_rules(&parsed.rules), diagnostics)
    }

    /// Register rules; later rules for the same key merge over earlier ones.
    pub fn add_rules(&mut self, rules: &[CssRule]) {
        for rule in rules {
            let target = match selector_key(&rule.selector) {
                Some(SelectorKey::Class(name)) => self.classes.entry(name),
                Some(SelectorKey::Tag(name)) => self.tags.entry(name),
                None => {
                    log::debug!("selector {} has no class or tag key", rule.selector);
                    continue;
                }
            };
            target.or_default().merge(&rule.declarations);
        }
    }

    /// Append another sheet (its rules win).
    pub fn merge(&mut self, other: &StyleSheet) {
        for (name, styles) in &other.classes {
            self.classes.entry(name.clone()).or_default().merge(styles);
        }
        for (name, styles) in &other.tags {
            self.tags.entry(name.clone()).or_default().merge(styles);
        }
    }

    /// Styles registered for a class.
    pub fn class(&self, name: &str) -> Option<&StyleMap> {
        self.classes.get(name)
    }

    /// Styles registered for a bare tag selector.
    pub fn tag(&self, name: &str) -> Option<&StyleMap> {
        self.tags.get(name)
    }

    /// Number of distinct class keys.
    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// True when nothing was registered.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.tags.is_empty()
    }
}

fn retag(diag: Diagnostic, source: &str) -> Diagnostic {
    match diag {
        Diagnostic::MalformedStyleDeclaration {
            source: selector,
            declaration,
            reason,
        } => Diagnostic::MalformedStyleDeclaration {
            source: alloc::format!("{} ({})", source, selector),
            declaration,
            reason,
        },
        other => other,
    }
}

/// Built-in per-tag styles applied beneath any book styling.
#[derive(Clone, Debug, PartialEq)]
pub struct TagDefaults {
    styles: BTreeMap<String, StyleMap>,
}

impl TagDefaults {
    /// No defaults at all.
    pub fn empty() -> Self {
        Self {
            styles: BTreeMap::new(),
        }
    }

    /// Reader defaults for common tags.
    pub fn builtin() -> Self {
        use StyleValue::{Fraction, Keyword, Number};
        let kw = |s: &str| Keyword(s.to_string());
        let heading = |size: f32, margin: f32| {
            StyleMap::new()
                .with("fontSize", Number(size))
                .with("fontWeight", kw("bold"))
                .with("marginVertical", Number(margin))
        };
        let bold = StyleMap::new().with("fontWeight", kw("bold"));
        let italic = StyleMap::new().with("fontStyle", kw("italic"));
        let list = StyleMap::new()
            .with("marginLeft", Number(20.0))
            .with("marginVertical", Number(10.0));

        let mut defaults = Self::empty();
        defaults.set("h1", heading(24.0, 10.0));
        defaults.set("h2", heading(20.0, 8.0));
        defaults.set("h3", heading(18.0, 6.0));
        defaults.set(
            "h4",
            StyleMap::new()
                .with("fontSize", Number(16.0))
                .with("fontWeight", kw("bold")),
        );
        defaults.set("p", StyleMap::new().with("marginBottom", Number(10.0)));
        defaults.set("b", bold.clone());
        defaults.set("strong", bold);
        defaults.set("i", italic.clone());
        defaults.set("em", italic);
        defaults.set(
            "u",
            StyleMap::new().with("textDecorationLine", kw("underline")),
        );
        defaults.set("ul", list.clone());
        defaults.set("ol", list);
        defaults.set("li", StyleMap::new().with("marginBottom", Number(5.0)));
        defaults.set(
            "img",
            StyleMap::new()
                .with("width", Fraction(1.0))
                .with("height", Number(200.0)),
        );
        defaults.set(
            "body",
            StyleMap::new()
                .with("fontSize", Number(16.0))
                .with("lineHeight", Number(24.0)),
        );
        defaults
    }

    /// Replace the defaults for `tag`.
    pub fn set(&mut self, tag: &str, styles: StyleMap) {
        self.styles.insert(tag.to_ascii_lowercase(), styles);
    }

    /// Defaults for `tag`.
    pub fn get(&self, tag: &str) -> Option<&StyleMap> {
        self.styles.get(tag)
    }
}

impl Default for TagDefaults {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Style options injected per book.
#[derive(Clone, Debug, PartialEq)]
pub struct StyleConfig {
    /// Root font size for `rem`/`em` conversion.
    pub base_font_size: f32,
    /// Built-in per-tag styles.
    pub tag_defaults: TagDefaults,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            base_font_size: DEFAULT_BASE_FONT_SIZE,
            tag_defaults: TagDefaults::builtin(),
        }
    }
}

impl StyleConfig {
    /// Set the root font size.
    pub fn with_base_font_size(mut self, size: f32) -> Self {
        if size.is_finite() && size > 0.0 {
            self.base_font_size = size;
        }
        self
    }

    /// Replace the tag defaults.
    pub fn with_tag_defaults(mut self, defaults: TagDefaults) -> Self {
        self.tag_defaults = defaults;
        self
    }
}

/// Everything needed to resolve an element's style.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StyleContext {
    /// Tag defaults and base font size.
    pub config: StyleConfig,
    /// Book and chapter styles.
    pub sheet: StyleSheet,
}

impl StyleContext {
    /// Combine a config and a sheet.
    pub fn new(config: StyleConfig, sheet: StyleSheet) -> Self {
        Self { config, sheet }
    }

    /// Resolve the style of one element.
    ///
    /// Layers, lowest first: tag default, tag rule, each class in
    /// `class="a b"` order, inline `style`. Later layers win.
    pub fn resolve(
        &self,
        tag: &str,
        class: Option<&str>,
        inline: Option<&str>,
    ) -> (StyleMap, Diagnostics) {
        let mut styles = self
            .config
            .tag_defaults
            .get(tag)
            .cloned()
            .unwrap_or_default();
        if let Some(rule) = self.sheet.tag(tag) {
            styles.merge(rule);
        }
        for name in class.unwrap_or("").split_whitespace() {
            if let Some(rule) = self.sheet.class(name) {
                styles.merge(rule);
            }
        }
        let diagnostics = match inline {
            Some(text) if !text.trim().is_empty() => {
                let (inline_styles, diagnostics) =
                    parse_inline_style_with(text, self.config.base_font_size);
                styles.merge(&inline_styles);
                diagnostics
            }
            _ => Diagnostics::new(),
        };
        (styles, diagnostics)
    }
}
