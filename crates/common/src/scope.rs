//! Scope resolution
//!
//! Expands a named scope into the ordered, deduplicated entry list handed to
//! the bundler. Bootstrap modules always come first and are never subject to
//! exclusion or filtering.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::config::{GroupSelection, ScopeDefinition, SpecGroup};
use crate::error::{Error, Result};
use crate::glob::{relative_slash, GlobPattern};

/// Scope name that selects every group
pub const ALL_SCOPE: &str = "all";

/// Separator for the external substring filter
pub const FILTER_SEPARATOR: char = '|';

/// Resolved lists at or below this size are logged in full
pub const SHOW_ALL_THRESHOLD: usize = 20;

/// Fixed setup modules, outermost first
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootstrapEntries {
    pub reset: PathBuf,
    pub global_setup: PathBuf,
    pub host_shim: Option<PathBuf>,
}

impl BootstrapEntries {
    pub fn to_vec(&self) -> Vec<PathBuf> {
        let mut entries = vec![self.reset.clone(), self.global_setup.clone()];
        entries.extend(self.host_shim.clone());
        entries
    }
}

/// Ordered entry list for one invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedFileSet {
    pub scope: String,
    pub bootstrap: Vec<PathBuf>,
    pub fixtures: Vec<PathBuf>,
}

impl ResolvedFileSet {
    /// Bootstrap entries followed by user fixtures
    pub fn entries(&self) -> Vec<PathBuf> {
        self.bootstrap
            .iter()
            .chain(self.fixtures.iter())
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fixtures.is_empty()
    }

    /// Human summary: every fixture when the list is short, the head otherwise
    pub fn summary(&self, test_root: &Path) -> String {
        let mut out = format!("scope '{}': {} fixture(s)", self.scope, self.fixtures.len());
        let shown = self.fixtures.len().min(SHOW_ALL_THRESHOLD);
        for path in &self.fixtures[..shown] {
            let display = relative_slash(test_root, path)
                .unwrap_or_else(|| path.display().to_string());
            out.push_str("\n  ");
            out.push_str(&display);
        }
        if self.fixtures.len() > shown {
            out.push_str(&format!("\n  ... and {} more", self.fixtures.len() - shown));
        }
        out
    }
}

/// Narrowing filter applied after scope resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubstringFilter {
    needles: Vec<String>,
}

impl SubstringFilter {
    /// Parse a `|`-delimited list; empty segments are dropped
    pub fn parse(raw: &str) -> Self {
        Self {
            needles: raw
                .split(FILTER_SEPARATOR)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Join already-normalized paths into the wire form
    pub fn join<I, S>(parts: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        parts
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(&FILTER_SEPARATOR.to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.needles.is_empty()
    }

    pub fn keeps(&self, path: &Path) -> bool {
        if self.needles.is_empty() {
            return true;
        }
        let haystack = path.to_string_lossy().replace('\\', "/");
        self.needles.iter().any(|n| haystack.contains(n.as_str()))
    }
}

/// Inputs for one resolution
#[derive(Debug, Clone, Copy)]
pub struct ScopeResolver<'a> {
    pub scopes: &'a [ScopeDefinition],
    pub groups: &'a [SpecGroup],
    pub test_root: &'a Path,
}

impl<'a> ScopeResolver<'a> {
    pub fn new(scopes: &'a [ScopeDefinition], groups: &'a [SpecGroup], test_root: &'a Path) -> Self {
        Self {
            scopes,
            groups,
            test_root,
        }
    }

    /// Every name accepted by [`ScopeResolver::resolve`]
    pub fn valid_names(&self) -> Vec<String> {
        std::iter::once(ALL_SCOPE.to_string())
            .chain(self.scopes.iter().map(|s| s.name.clone()))
            .collect()
    }

    /// Resolve `scope_name` into the bundler's entry list
    pub fn resolve(
        &self,
        scope_name: &str,
        bootstrap: &BootstrapEntries,
        filter: &SubstringFilter,
    ) -> Result<ResolvedFileSet> {
        let (patterns, excludes) = self.patterns_for(scope_name)?;
        debug!(scope = scope_name, patterns = patterns.len(), "expanding scope");

        let mut seen = HashSet::new();
        let mut fixtures = Vec::new();
        for pattern in &patterns {
            let glob = GlobPattern::new(pattern)?;
            for path in glob.expand(self.test_root) {
                if seen.insert(path.clone()) {
                    fixtures.push(path);
                }
            }
        }

        if !excludes.is_empty() {
            let excludes = excludes
                .iter()
                .map(|p| GlobPattern::new(p))
                .collect::<Result<Vec<_>>>()?;
            fixtures.retain(|path| {
                let relative = relative_slash(self.test_root, path).unwrap_or_default();
                !excludes.iter().any(|g| g.is_match(&relative))
            });
        }

        if !filter.is_empty() {
            fixtures.retain(|path| filter.keeps(path));
        }

        let resolved = ResolvedFileSet {
            scope: scope_name.to_string(),
            bootstrap: bootstrap.to_vec(),
            fixtures,
        };
        info!("{}", resolved.summary(self.test_root));
        Ok(resolved)
    }

    fn patterns_for(&self, scope_name: &str) -> Result<(Vec<String>, Vec<String>)> {
        if scope_name == ALL_SCOPE {
            return Ok((self.all_group_patterns(), Vec::new()));
        }

        let scope = self
            .scopes
            .iter()
            .find(|s| s.name == scope_name)
            .ok_or_else(|| Error::UnknownScope {
                name: scope_name.to_string(),
                valid: self.valid_names(),
            })?;

        let mut patterns = match &scope.groups {
            Some(GroupSelection::All) => self.all_group_patterns(),
            Some(GroupSelection::Named(names)) => self
                .groups
                .iter()
                .filter(|g| names.contains(&g.name))
                .flat_map(|g| g.specs.iter().cloned())
                .collect(),
            None => Vec::new(),
        };
        patterns.extend(scope.include.iter().cloned());

        Ok((patterns, scope.exclude.clone()))
    }

    fn all_group_patterns(&self) -> Vec<String> {
        self.groups
            .iter()
            .flat_map(|g| g.specs.iter().cloned())
            .collect()
    }
}

/// Free-function form of [`ScopeResolver::resolve`]
pub fn resolve(
    scope_name: &str,
    scopes: &[ScopeDefinition],
    groups: &[SpecGroup],
    test_root: &Path,
    bootstrap: &BootstrapEntries,
    filter: &SubstringFilter,
) -> Result<ResolvedFileSet> {
    ScopeResolver::new(scopes, groups, test_root).resolve(scope_name, bootstrap, filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("a|b", &["a", "b"] ; "two needles")]
    #[test_case("a||b|", &["a", "b"] ; "empty segments dropped")]
    #[test_case("", &[] ; "empty filter")]
    fn parses_filter(raw: &str, expected: &[&str]) {
        let filter = SubstringFilter::parse(raw);
        assert_eq!(filter.needles, expected);
    }

    #[test]
    fn filter_keeps_any_needle() {
        let filter = SubstringFilter::parse("dom/a|css/b");
        assert!(filter.keeps(Path::new("/t/specs/dom/a.ts")));
        assert!(filter.keeps(Path::new("/t/specs/css/b.html")));
        assert!(!filter.keeps(Path::new("/t/specs/css/c.html")));
        assert!(SubstringFilter::default().keeps(Path::new("/anything")));
    }

    #[test]
    fn join_uses_pipe() {
        assert_eq!(SubstringFilter::join(["specs/a.ts", "specs/b.ts"]), "specs/a.ts|specs/b.ts");
    }

    #[test]
    fn summary_truncates_long_lists() {
        let root = Path::new("/t");
        let set = ResolvedFileSet {
            scope: "x".to_string(),
            bootstrap: vec![],
            fixtures: (0..25).map(|i| root.join(format!("f{i}.html"))).collect(),
        };
        let summary = set.summary(root);
        assert!(summary.contains("25 fixture(s)"));
        assert!(summary.contains("f19.html"));
        assert!(!summary.contains("f20.html"));
        assert!(summary.contains("and 5 more"));
    }

    #[test]
    fn unknown_scope_enumerates_names() {
        let scopes = vec![ScopeDefinition {
            name: "css".to_string(),
            description: String::new(),
            groups: None,
            include: vec![],
            exclude: vec![],
        }];
        let resolver = ScopeResolver::new(&scopes, &[], Path::new("/nowhere"));
        let bootstrap = BootstrapEntries {
            reset: PathBuf::from("r"),
            global_setup: PathBuf::from("g"),
            host_shim: None,
        };
        let err = resolver
            .resolve("nope", &bootstrap, &SubstringFilter::default())
            .unwrap_err();
        match err {
            Error::UnknownScope { name, valid } => {
                assert_eq!(name, "nope");
                assert_eq!(valid, vec!["all", "css"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
