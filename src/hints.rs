//! Format-spec and render-hint parsing
//!
//! An interpolation's raw format spec reads `key : hints`. The key indexes
//! the interpolation inside its tree; the hints are `:`-separated directives
//! (`xml=TAG`, `header`, `header=TITLE`, `sep=VALUE`) that change how the
//! rendered value is wrapped.
//!
//! Author: Moroya Sakamoto

/// Derives `(key, render_hints)` from a raw format spec
pub trait FormatSpecParser {
    fn parse(&self, format_spec: &str, expression: &str) -> (String, String);
}

/// The standard `key : hints` mini-language
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSpecParser;

impl FormatSpecParser for DefaultSpecParser {
    fn parse(&self, format_spec: &str, expression: &str) -> (String, String) {
        parse_format_spec(format_spec, expression)
    }
}

/// Split a format spec into key and render hints
///
/// - empty spec or `_` → key is the expression, no hints
/// - spec containing `:` → trimmed text before the first `:` is the key,
///   everything after it is the hint string
/// - otherwise the trimmed spec is the key
pub fn parse_format_spec(format_spec: &str, expression: &str) -> (String, String) {
    if format_spec.is_empty() || format_spec == "_" {
        return (String::from(expression), String::new());
    }
    match format_spec.split_once(':') {
        Some((key, hints)) => (String::from(key.trim()), String::from(hints)),
        None => (String::from(format_spec.trim()), String::new()),
    }
}

/// Parsed render directives
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderHints {
    /// Tag for the inner `<tag>\n … \n</tag>` wrap
    pub xml: Option<String>,
    /// Title for the outer markdown header wrap
    pub header: Option<String>,
    /// List separator override
    pub separator: Option<String>,
}

impl RenderHints {
    /// Parse a hint string; `key` is the header title when `header` has no value
    pub fn parse(hints: &str, key: &str) -> Self {
        let mut parsed = Self::default();
        if hints.is_empty() {
            return parsed;
        }
        for directive in hints.split(':') {
            let (name, value) = match directive.split_once('=') {
                Some((name, value)) => (name.trim(), Some(value)),
                None => (directive.trim(), None),
            };
            match name {
                "xml" => {
                    if let Some(tag) = value.map(str::trim).filter(|t| !t.is_empty()) {
                        parsed.xml = Some(String::from(tag));
                    }
                }
                "header" => {
                    let title = value.map(str::trim).filter(|t| !t.is_empty()).unwrap_or(key);
                    parsed.header = Some(String::from(title));
                }
                // separator whitespace is significant
                "sep" => parsed.separator = Some(String::from(value.unwrap_or(""))),
                _ => {}
            }
        }
        parsed
    }

    /// True when a header directive is present
    pub fn has_header(&self) -> bool {
        self.header.is_some()
    }
}

/// List separator from a hint string, or `default` when absent
pub fn parse_separator(hints: &str, default: &str) -> String {
    RenderHints::parse(hints, "")
        .separator
        .unwrap_or_else(|| String::from(default))
}
