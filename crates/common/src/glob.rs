//! Glob patterns over the test root
//!
//! Patterns are translated into anchored regular expressions and matched
//! against forward-slash relative paths. Supported syntax: `*`, `**`, `?`,
//! `[...]` / `[!...]` classes, `{a,b}` alternation and `\` escapes.

use std::path::{Component, Path, PathBuf};

use regex::Regex;
use tracing::trace;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Directory skipped by every expansion, whatever the scope says
pub const IGNORED_DIR: &str = "node_modules";

/// A compiled glob pattern
#[derive(Debug, Clone)]
pub struct GlobPattern {
    source: String,
    regex: Regex,
}

impl GlobPattern {
    /// Compile a glob pattern
    pub fn new(pattern: &str) -> Result<Self> {
        let normalized = pattern.trim_start_matches("./");
        let translated = translate(normalized).map_err(|reason| Error::InvalidGlob {
            pattern: pattern.to_string(),
            reason,
        })?;
        let regex = Regex::new(&translated).map_err(|e| Error::InvalidGlob {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            source: normalized.to_string(),
            regex,
        })
    }

    /// The pattern as written (minus any leading `./`)
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match a forward-slash relative path
    pub fn is_match(&self, relative: &str) -> bool {
        self.regex.is_match(relative)
    }

    /// Leading directory components that contain no glob syntax
    pub fn literal_prefix(&self) -> PathBuf {
        let mut prefix = PathBuf::new();
        let mut segments = self.source.split('/').peekable();
        while let Some(segment) = segments.next() {
            // The last segment names files, never a directory to descend into.
            if segments.peek().is_none() || segment.chars().any(is_meta) {
                break;
            }
            prefix.push(segment);
        }
        prefix
    }

    /// Expand against `root`, returning absolute paths in sorted walk order
    pub fn expand(&self, root: &Path) -> Vec<PathBuf> {
        let base = root.join(self.literal_prefix());
        if !base.is_dir() {
            trace!(pattern = %self.source, base = %base.display(), "glob base does not exist");
            return Vec::new();
        }

        WalkDir::new(&base)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.file_name() != IGNORED_DIR)
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                let relative = relative_slash(root, e.path())?;
                self.is_match(&relative).then(|| e.into_path())
            })
            .collect()
    }
}

/// Render `path` relative to `root` with forward slashes
pub fn relative_slash(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    Some(to_slash(relative))
}

/// Join path components with forward slashes regardless of host separator
pub fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_meta(c: char) -> bool {
    matches!(c, '*' | '?' | '[' | '{' | '\\')
}

fn translate(pattern: &str) -> std::result::Result<String, String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut braces = 0usize;
    let mut i = 0;

    out.push('^');
    while i < chars.len() {
        let c = chars[i];
        match c {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'/') {
                    out.push_str("(?:[^/]*/)*");
                    i += 3;
                } else {
                    out.push_str(".*");
                    i += 2;
                }
                continue;
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '[' => {
                let close = chars[i + 1..]
                    .iter()
                    .position(|&c| c == ']')
                    .ok_or_else(|| "unterminated character class".to_string())?;
                let class = &chars[i + 1..i + 1 + close];
                out.push('[');
                for (n, &ch) in class.iter().enumerate() {
                    match ch {
                        '!' if n == 0 => out.push('^'),
                        '[' | '\\' | '&' | '~' => {
                            out.push('\\');
                            out.push(ch);
                        }
                        '^' if n == 0 => out.push_str("\\^"),
                        _ => out.push(ch),
                    }
                }
                out.push(']');
                i += close + 2;
                continue;
            }
            '{' => {
                braces += 1;
                out.push_str("(?:");
            }
            '}' if braces > 0 => {
                braces -= 1;
                out.push(')');
            }
            ',' if braces > 0 => out.push('|'),
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .ok_or_else(|| "dangling escape".to_string())?;
                out.push_str(&regex::escape(&escaped.to_string()));
                i += 2;
                continue;
            }
            _ => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }

    if braces > 0 {
        return Err("unclosed brace".to_string());
    }
    out.push('$');
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use test_case::test_case;

    #[test_case("css/*.html", "css/a.html", true ; "star in leaf")]
    #[test_case("css/*.html", "css/sub/a.html", false ; "star stops at slash")]
    #[test_case("css/**/*.html", "css/a.html", true ; "globstar matches zero dirs")]
    #[test_case("css/**/*.html", "css/x/y/a.html", true ; "globstar matches nested")]
    #[test_case("specs/**", "specs/dom/a.ts", true ; "trailing globstar")]
    #[test_case("a?.ts", "ab.ts", true ; "question mark")]
    #[test_case("a?.ts", "a/.ts", false ; "question mark not slash")]
    #[test_case("*.{ts,tsx}", "x.tsx", true ; "alternation")]
    #[test_case("*.{ts,tsx}", "x.js", false ; "alternation miss")]
    #[test_case("[ab].ts", "b.ts", true ; "class")]
    #[test_case("[!ab].ts", "a.ts", false ; "negated class")]
    #[test_case("./css/a.html", "css/a.html", true ; "leading dot slash")]
    fn matches(pattern: &str, path: &str, expected: bool) {
        let glob = GlobPattern::new(pattern).unwrap();
        assert_eq!(glob.is_match(path), expected);
    }

    #[test]
    fn rejects_malformed_patterns() {
        assert!(matches!(
            GlobPattern::new("css/[ab.html"),
            Err(Error::InvalidGlob { .. })
        ));
        assert!(GlobPattern::new("css/{a,b.html").is_err());
    }

    #[test]
    fn literal_prefix_stops_at_meta() {
        let glob = GlobPattern::new("specs/css/**/*.html").unwrap();
        assert_eq!(glob.literal_prefix(), PathBuf::from("specs/css"));
        let glob = GlobPattern::new("a.html").unwrap();
        assert_eq!(glob.literal_prefix(), PathBuf::new());
    }

    #[test]
    fn expand_is_sorted_and_skips_node_modules() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        for rel in ["css/b.html", "css/a.html", "css/node_modules/c.html", "css/x/d.html"] {
            let path = root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, "").unwrap();
        }

        let glob = GlobPattern::new("css/**/*.html").unwrap();
        let found: Vec<String> = glob
            .expand(root)
            .iter()
            .map(|p| relative_slash(root, p).unwrap())
            .collect();
        assert_eq!(found, vec!["css/a.html", "css/b.html", "css/x/d.html"]);
    }

    #[test]
    fn expand_missing_base_is_empty() {
        let tmp = TempDir::new().unwrap();
        let glob = GlobPattern::new("nothing/*.html").unwrap();
        assert!(glob.expand(tmp.path()).is_empty());
    }
}
