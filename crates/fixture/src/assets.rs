//! Resource copying and reference rewriting
//!
//! A relative reference that resolves to an existing file under a vendored
//! subtree has every sibling of that file copied into
//! `<build output>/<parent dir name>/`, and the reference rewritten to point
//! at the copy. Anything else is left exactly as written.
//!
//! Only path components below the test root count towards the vendor check,
//! so a checkout that itself lives under `support/` is not vendored.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, trace};

use crate::error::{FixtureError, FixtureResult};

static SCHEME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:").expect("valid scheme regex"));

/// Source files already copied during one fixture compile
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopiedAssetSet {
    copied: BTreeSet<PathBuf>,
}

impl CopiedAssetSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, source: &Path) -> bool {
        self.copied.contains(source)
    }

    pub fn insert(&mut self, source: PathBuf) -> bool {
        self.copied.insert(source)
    }

    pub fn len(&self) -> usize {
        self.copied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.copied.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.copied.iter()
    }
}

/// Per-compile reference rewriter
pub struct AssetRewriter<'a> {
    root: PathBuf,
    fixture_dir: &'a Path,
    output_dir: &'a Path,
    vendor_dirs: &'a [String],
    copied: CopiedAssetSet,
}

impl<'a> AssetRewriter<'a> {
    /// `root` is the test root; vendor directories are looked up below it
    pub fn new(root: &Path, fixture_dir: &'a Path, output_dir: &'a Path, vendor_dirs: &'a [String]) -> Self {
        Self {
            root: normalize(root),
            fixture_dir,
            output_dir,
            vendor_dirs,
            copied: CopiedAssetSet::new(),
        }
    }

    /// Resolve, conditionally copy and rewrite one reference.
    ///
    /// Returns `Ok(None)` when the reference stays as written.
    pub fn rewrite(&mut self, reference: &str) -> FixtureResult<Option<String>> {
        if !is_relative_reference(reference) {
            return Ok(None);
        }

        let (path_part, _suffix) = split_suffix(reference);
        let resolved = normalize(&self.fixture_dir.join(path_part));
        if !resolved.is_file() {
            trace!(reference, resolved = %resolved.display(), "reference does not resolve to a file");
            return Ok(None);
        }
        if !self.is_vendored(&resolved, path_part) {
            return Ok(None);
        }

        self.copy_siblings(&resolved)?;
        Ok(Some(normalized_reference(reference)))
    }

    /// Hand back the copied set once the compile is done
    pub fn finish(self) -> CopiedAssetSet {
        self.copied
    }

    /// Components below the root, or the reference's own components when it
    /// resolves outside the root
    fn is_vendored(&self, resolved: &Path, path_part: &str) -> bool {
        let below = match resolved.strip_prefix(&self.root) {
            Ok(relative) => relative,
            Err(_) => Path::new(path_part),
        };
        below.components().any(|c| match c {
            Component::Normal(part) => self.vendor_dirs.iter().any(|v| part == v.as_str()),
            _ => false,
        })
    }

    fn copy_siblings(&mut self, resolved: &Path) -> FixtureResult<()> {
        let Some(source_dir) = resolved.parent() else {
            return Ok(());
        };
        let Some(dir_name) = source_dir.file_name() else {
            return Ok(());
        };
        let dest_dir = self.output_dir.join(dir_name);
        fs::create_dir_all(&dest_dir)?;

        let mut siblings: Vec<PathBuf> = fs::read_dir(source_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        siblings.sort();

        for source in siblings {
            if self.copied.contains(&source) {
                continue;
            }
            let Some(name) = source.file_name() else {
                continue;
            };
            let dest = dest_dir.join(name);
            fs::copy(&source, &dest).map_err(|e| FixtureError::AssetCopy {
                from: source.clone(),
                to: dest.clone(),
                source: e,
            })?;
            debug!("Copied {} -> {}", source.display(), dest.display());
            self.copied.insert(source);
        }
        Ok(())
    }
}

/// Relative, non-rooted, non-protocol-relative, scheme-less reference
pub fn is_relative_reference(reference: &str) -> bool {
    let reference = reference.trim();
    !(reference.is_empty()
        || reference.starts_with('/')
        || reference.starts_with('\\')
        || reference.starts_with('#')
        || reference.starts_with('?')
        || SCHEME_RE.is_match(reference))
}

/// `./`-prefixed, forward-slash form with leading `./` and `../` segments removed
pub fn normalized_reference(reference: &str) -> String {
    let mut rest = reference.trim().replace('\\', "/");
    loop {
        if let Some(stripped) = rest.strip_prefix("../") {
            rest = stripped.to_string();
        } else if let Some(stripped) = rest.strip_prefix("./") {
            rest = stripped.to_string();
        } else {
            break;
        }
    }
    format!("./{rest}")
}

fn split_suffix(reference: &str) -> (&str, &str) {
    let reference = reference.trim();
    match reference.find(['?', '#']) {
        Some(i) => reference.split_at(i),
        None => (reference, ""),
    }
}

/// Lexical normalization; does not touch the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use test_case::test_case;

    #[test_case("a.png", true ; "bare file")]
    #[test_case("../support/a.png", true ; "parent relative")]
    #[test_case("/abs/a.png", false ; "rooted")]
    #[test_case("//cdn.example.com/a.png", false ; "protocol relative")]
    #[test_case("https://example.com/a.png", false ; "http scheme")]
    #[test_case("data:image/png;base64,AAAA", false ; "data uri")]
    #[test_case("#frag", false ; "fragment only")]
    #[test_case("", false ; "empty")]
    fn relative_reference_detection(reference: &str, expected: bool) {
        assert_eq!(is_relative_reference(reference), expected);
    }

    #[test_case("../support/a.png", "./support/a.png" ; "one parent")]
    #[test_case("../../support/a.png", "./support/a.png" ; "two parents")]
    #[test_case("./support/a.png", "./support/a.png" ; "already dotted")]
    #[test_case("support\\a.png", "./support/a.png" ; "backslashes")]
    #[test_case("support/a.png?v=1", "./support/a.png?v=1" ; "query kept")]
    fn reference_normalization(reference: &str, expected: &str) {
        assert_eq!(normalized_reference(reference), expected);
    }

    #[test]
    fn normalize_resolves_parent_segments() {
        assert_eq!(
            normalize(Path::new("/t/specs/css/../support/./a.png")),
            PathBuf::from("/t/specs/support/a.png")
        );
    }

    fn vendor() -> Vec<String> {
        vec!["support".to_string()]
    }

    #[test]
    fn copies_every_sibling_once() {
        let tmp = TempDir::new().unwrap();
        let specs = tmp.path().join("specs");
        let support = specs.join("support");
        fs::create_dir_all(specs.join("css")).unwrap();
        fs::create_dir_all(&support).unwrap();
        fs::write(support.join("a.png"), b"a").unwrap();
        fs::write(support.join("b.png"), b"b").unwrap();
        let out = tmp.path().join("out");

        let fixture_dir = specs.join("css");
        let vendor = vendor();
        let mut rewriter = AssetRewriter::new(&specs, &fixture_dir, &out, &vendor);
        assert_eq!(
            rewriter.rewrite("../support/a.png").unwrap(),
            Some("./support/a.png".to_string())
        );
        assert_eq!(
            rewriter.rewrite("../support/b.png").unwrap(),
            Some("./support/b.png".to_string())
        );
        let copied = rewriter.finish();
        assert_eq!(copied.len(), 2);
        assert_eq!(fs::read(out.join("support/a.png")).unwrap(), b"a");
        assert_eq!(fs::read(out.join("support/b.png")).unwrap(), b"b");
    }

    #[test]
    fn missing_or_unvendored_references_stay_put() {
        let tmp = TempDir::new().unwrap();
        let specs = tmp.path().join("specs");
        fs::create_dir_all(specs.join("images")).unwrap();
        fs::write(specs.join("images/x.png"), b"x").unwrap();
        let out = tmp.path().join("out");

        let vendor = vendor();
        let mut rewriter = AssetRewriter::new(&specs, &specs, &out, &vendor);
        assert_eq!(rewriter.rewrite("support/missing.png").unwrap(), None);
        assert_eq!(rewriter.rewrite("images/x.png").unwrap(), None);
        assert!(rewriter.finish().is_empty());
        assert!(!out.exists());
    }

    #[test]
    fn vendor_named_ancestors_of_the_root_do_not_count() {
        let tmp = TempDir::new().unwrap();
        let specs = tmp.path().join("support/project/specs");
        fs::create_dir_all(specs.join("images")).unwrap();
        fs::write(specs.join("images/x.png"), b"x").unwrap();
        fs::write(specs.join("images/y.png"), b"y").unwrap();
        let out = tmp.path().join("out");

        let vendor = vendor();
        let mut rewriter = AssetRewriter::new(&specs, &specs, &out, &vendor);
        assert_eq!(rewriter.rewrite("images/x.png").unwrap(), None);
        assert!(rewriter.finish().is_empty());
        assert!(!out.exists());
    }

    #[test]
    fn references_leaving_the_root_use_their_own_components() {
        let tmp = TempDir::new().unwrap();
        let specs = tmp.path().join("specs");
        let shared = tmp.path().join("shared/support");
        fs::create_dir_all(&specs).unwrap();
        fs::create_dir_all(&shared).unwrap();
        fs::write(shared.join("a.png"), b"a").unwrap();
        fs::write(tmp.path().join("shared/plain.png"), b"p").unwrap();
        let out = tmp.path().join("out");

        let vendor = vendor();
        let mut rewriter = AssetRewriter::new(&specs, &specs, &out, &vendor);
        assert_eq!(
            rewriter.rewrite("../shared/support/a.png").unwrap(),
            Some("./shared/support/a.png".to_string())
        );
        assert_eq!(rewriter.rewrite("../shared/plain.png").unwrap(), None);
        assert_eq!(fs::read(out.join("support/a.png")).unwrap(), b"a");
    }
}
