//! Textual rewriting of resource references inside `<style>` blocks
//!
//! Fixtures include intentionally broken stylesheets, so this is pattern
//! matching over text rather than a stylesheet parse.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// `@import "x.css"`, `@import 'x.css'`, `@import url(x.css)`
static IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"@import\s*(?:url\(\s*)?['"]?([^'"\s;)]+)"#).expect("valid import regex")
});

/// The value part of a `background` or `background-image` declaration
static BACKGROUND_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)background(?:-image)?\s*:([^;}]*)").expect("valid background regex")
});

/// Every `url(...)` inside a declaration value
static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"url\(\s*['"]?([^'")\s]+)"#).expect("valid url regex"));

/// Rewrite every `@import` and background `url()` target in `css`.
///
/// `rewrite` returns `None` to leave a reference untouched. Imports are
/// visited first, then background URLs, each in source order.
pub fn rewrite_references<F>(css: &str, mut rewrite: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let imported = replace_group(&IMPORT_RE, css, 1, &mut rewrite);
    BACKGROUND_RE
        .replace_all(&imported, |caps: &Captures| {
            let whole = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
            let value = match caps.get(1) {
                Some(m) => m,
                None => return whole.to_string(),
            };
            let offset = value.start() - caps.get(0).map(|m| m.start()).unwrap_or(0);
            let rewritten = replace_group(&URL_RE, value.as_str(), 1, &mut rewrite);
            format!("{}{}", &whole[..offset], rewritten)
        })
        .into_owned()
}

/// Collect the reference targets without rewriting
pub fn references(css: &str) -> Vec<String> {
    let mut found = Vec::new();
    rewrite_references(css, |target| {
        found.push(target.to_string());
        None
    });
    found
}

fn replace_group<F>(re: &Regex, text: &str, group: usize, rewrite: &mut F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    re.replace_all(text, |caps: &Captures| {
        let (Some(whole), Some(target)) = (caps.get(0), caps.get(group)) else {
            return caps.get(0).map(|m| m.as_str().to_string()).unwrap_or_default();
        };
        match rewrite(target.as_str()) {
            Some(replacement) => {
                let start = target.start() - whole.start();
                let end = target.end() - whole.start();
                let raw = whole.as_str();
                format!("{}{}{}", &raw[..start], replacement, &raw[end..])
            }
            None => whole.as_str().to_string(),
        }
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_imports_and_backgrounds_in_order() {
        let css = r#"
@import "../support/a.css";
@import url('b.css');
div { background: red url(../support/c.png) no-repeat; }
p { background-image: url("d.png"), url(e.png) }
span { color: url(not-me.png); }
"#;
        assert_eq!(
            references(css),
            vec!["../support/a.css", "b.css", "../support/c.png", "d.png", "e.png"]
        );
    }

    #[test]
    fn rewrites_only_selected_targets() {
        let css = "@import 'keep.css'; a { background-image: url(../support/x.png); }";
        let out = rewrite_references(css, |t| t.contains("support").then(|| "./support/x.png".to_string()));
        assert_eq!(out, "@import 'keep.css'; a { background-image: url(./support/x.png); }");
    }

    #[test]
    fn malformed_css_is_left_alone() {
        let css = "a { background: url( ; @import ; } }}} background-image:";
        let out = rewrite_references(css, |_| Some("X".to_string()));
        assert!(out.contains("}}}"));
        assert!(!out.contains("background: X"));
    }
}
