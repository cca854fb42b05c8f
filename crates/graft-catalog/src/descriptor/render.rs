//! Text rendering helpers.

use super::parser::classify_bare;
use super::ConfigValue;

fn is_special(c: char) -> bool {
    matches!(c, ',' | '=' | '(' | ')' | '"' | '\\') || c.is_whitespace()
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Renders a key, quoting it if it would not survive a re-parse bare.
pub(crate) fn render_key(key: &str) -> String {
    if key.is_empty() || key.chars().any(is_special) {
        quote(key)
    } else {
        key.to_string()
    }
}

/// Renders a string value.
///
/// A string is written bare unless it contains a delimiter or would parse
/// back as something other than the same string.
pub(crate) fn render_string(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }
    let bare_ok = !s.chars().any(is_special)
        && matches!(classify_bare(s), Ok(ConfigValue::Str(ref parsed)) if parsed == s);
    if bare_ok {
        s.to_string()
    } else {
        quote(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_string() {
        assert_eq!(render_string("snappy"), "snappy");
        assert_eq!(render_string(""), "");
        assert_eq!(render_string("a b"), "\"a b\"");
        assert_eq!(render_string("4KB"), "\"4KB\"");
        assert_eq!(render_string("false"), "\"false\"");
        assert_eq!(render_string(r#"say "hi""#), r#""say \"hi\"""#);
        assert_eq!(render_string(r"C:\x"), r#""C:\\x""#);
    }

    #[test]
    fn test_render_key() {
        assert_eq!(render_key("leaf_page_max"), "leaf_page_max");
        assert_eq!(render_key("a=b"), "\"a=b\"");
        assert_eq!(render_key(""), "\"\"");
    }
}
