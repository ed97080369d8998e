//! Fixture compiler
//!
//! Turns one markup fixture into a generated test module. Scripts are lifted
//! out of the tree and replayed by the module after the markup has been
//! parsed, vendored resources are copied next to the module, and the
//! fixture's top-level `fit`/`xit` marker picks how the test is registered.

use std::fs;
use std::path::{Path, PathBuf};

use specrig_common::config::FixtureConfig;
use specrig_common::glob::{relative_slash, to_slash};
use tracing::{debug, info};

use crate::assets::{AssetRewriter, CopiedAssetSet};
use crate::codegen::{emit_module, ExecutionMode, ModuleSpec};
use crate::css;
use crate::error::{FixtureError, FixtureResult};
use crate::markup::{Document, NodeId};
use crate::snapshot::{SnapshotOptions, SnapshotOptionsProvider};

/// Marker attribute: register the test exclusively
pub const EXCLUSIVE_MARKER: &str = "fit";

/// Marker attribute: register the test as skipped
pub const SKIP_MARKER: &str = "xit";

/// Result of compiling one fixture
#[derive(Debug, Clone)]
pub struct CompiledFixture {
    /// Fixture path relative to the test root
    pub name: String,
    pub module_text: String,
    /// Extracted script payloads in document order
    pub scripts: Vec<String>,
    pub mode: ExecutionMode,
    /// Serialized tree with scripts stripped and references rewritten
    pub markup: String,
    pub options: SnapshotOptions,
    pub copied: CopiedAssetSet,
}

#[derive(Debug, Clone)]
pub struct FixtureCompiler {
    test_root: PathBuf,
    vendor_dirs: Vec<String>,
    parse_binding: String,
}

/// Script payloads plus the handles needed to strip them afterwards
#[derive(Debug, Default)]
struct ScriptCollection {
    payloads: Vec<String>,
    text_nodes: Vec<NodeId>,
    elements: Vec<NodeId>,
}

impl FixtureCompiler {
    pub fn new(test_root: impl Into<PathBuf>) -> Self {
        let defaults = FixtureConfig::default();
        Self {
            test_root: test_root.into(),
            vendor_dirs: defaults.vendor_dirs,
            parse_binding: defaults.parse_binding,
        }
    }

    pub fn from_config(config: &FixtureConfig, test_root: impl Into<PathBuf>) -> Self {
        Self {
            test_root: test_root.into(),
            vendor_dirs: config.vendor_dirs.clone(),
            parse_binding: config.parse_binding.clone(),
        }
    }

    pub fn with_vendor_dirs(mut self, vendor_dirs: Vec<String>) -> Self {
        self.vendor_dirs = vendor_dirs;
        self
    }

    pub fn test_root(&self) -> &Path {
        &self.test_root
    }

    /// Compile fixture text into a test module.
    ///
    /// Malformed markup and references that resolve to nothing are carried
    /// through unchanged; only failures writing into `build_output_dir` are
    /// reported.
    pub fn compile(
        &self,
        fixture_path: &Path,
        fixture_text: &str,
        build_output_dir: &Path,
        provider: &dyn SnapshotOptionsProvider,
    ) -> FixtureResult<CompiledFixture> {
        fs::create_dir_all(build_output_dir)?;

        let name = relative_slash(&self.test_root, fixture_path).unwrap_or_else(|| to_slash(fixture_path));
        let fixture_dir = fixture_path.parent().unwrap_or_else(|| Path::new("."));

        let mut doc = Document::parse(fixture_text);
        let mut rewriter = AssetRewriter::new(&self.test_root, fixture_dir, build_output_dir, &self.vendor_dirs);
        let collected = collect_and_rewrite(&mut doc, &mut rewriter)?;
        strip_scripts(&mut doc, &collected);

        let mode = detect_mode(&doc);
        let markup = doc.serialize();
        let options = provider.options_for(fixture_path);

        let module_text = emit_module(&ModuleSpec {
            name: &name,
            markup: &markup,
            scripts: &collected.payloads,
            mode,
            options: &options,
            parse_binding: &self.parse_binding,
        });
        let copied = rewriter.finish();

        debug!(
            "Compiled {} ({} scripts, {} assets copied, mode {:?})",
            name,
            collected.payloads.len(),
            copied.len(),
            mode
        );

        Ok(CompiledFixture {
            name,
            module_text,
            scripts: collected.payloads,
            mode,
            markup,
            options,
            copied,
        })
    }

    /// Read a fixture from disk and compile it
    pub fn compile_file(
        &self,
        fixture_path: &Path,
        build_output_dir: &Path,
        provider: &dyn SnapshotOptionsProvider,
    ) -> FixtureResult<CompiledFixture> {
        info!("Compiling fixture {}", fixture_path.display());
        let text = fs::read_to_string(fixture_path)?;
        self.compile(fixture_path, &text, build_output_dir, provider)
    }
}

/// Depth-first pass: gather script payloads and rewrite resource references
fn collect_and_rewrite(doc: &mut Document, rewriter: &mut AssetRewriter<'_>) -> FixtureResult<ScriptCollection> {
    let mut collected = ScriptCollection::default();

    for id in doc.descendants() {
        let Some(element) = doc.element(id) else {
            continue;
        };

        if element.is("script") {
            collected.elements.push(id);
            for &child in doc.children(id) {
                if let Some(payload) = doc.text(child) {
                    collected.payloads.push(payload.to_string());
                    collected.text_nodes.push(child);
                }
            }
        } else if element.is("style") {
            let texts: Vec<NodeId> = doc.children(id).to_vec();
            for child in texts {
                let Some(payload) = doc.text(child) else {
                    continue;
                };
                let rewritten = rewrite_css(payload, rewriter)?;
                doc.set_text(child, rewritten);
            }
        } else {
            let attr = if element.is("link") {
                "href"
            } else if element.is("img") {
                "src"
            } else {
                continue;
            };
            let Some(reference) = element.attr(attr).map(str::to_string) else {
                continue;
            };
            if let Some(rewritten) = rewriter.rewrite(&reference)? {
                if let Some(element) = doc.element_mut(id) {
                    element.set_attr(attr, rewritten);
                }
            }
        }
    }

    Ok(collected)
}

fn rewrite_css(payload: &str, rewriter: &mut AssetRewriter<'_>) -> FixtureResult<String> {
    let mut failure: Option<FixtureError> = None;
    let rewritten = css::rewrite_references(payload, |target| {
        if failure.is_some() {
            return None;
        }
        match rewriter.rewrite(target) {
            Ok(replacement) => replacement,
            Err(e) => {
                failure = Some(e);
                None
            }
        }
    });
    match failure {
        Some(e) => Err(e),
        None => Ok(rewritten),
    }
}

/// Clear collected script payloads, then drop the emptied script elements
fn strip_scripts(doc: &mut Document, collected: &ScriptCollection) {
    for &text in &collected.text_nodes {
        doc.set_text(text, String::new());
    }
    for &element in &collected.elements {
        doc.detach(element);
    }
}

/// `fit` on any top-level element wins over `xit`
fn detect_mode(doc: &Document) -> ExecutionMode {
    let mut mode = ExecutionMode::Normal;
    for element in doc.top_level_elements() {
        if element.has_attr(EXCLUSIVE_MARKER) {
            return ExecutionMode::Exclusive;
        }
        if element.has_attr(SKIP_MARKER) {
            mode = ExecutionMode::Skip;
        }
    }
    mode
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::DefaultSnapshotOptions;
    use tempfile::TempDir;
    use test_case::test_case;

    #[test_case("<html><p>x</p></html>", ExecutionMode::Normal ; "no marker")]
    #[test_case("<html fit><p>x</p></html>", ExecutionMode::Exclusive ; "exclusive")]
    #[test_case("<html xit><p>x</p></html>", ExecutionMode::Skip ; "skipped")]
    #[test_case("<html xit fit></html>", ExecutionMode::Exclusive ; "both on one element")]
    #[test_case("<div xit></div><div fit></div>", ExecutionMode::Exclusive ; "both across elements")]
    #[test_case("<html><body fit></body></html>", ExecutionMode::Normal ; "nested marker ignored")]
    fn modifier_detection(src: &str, expected: ExecutionMode) {
        assert_eq!(detect_mode(&Document::parse(src)), expected);
    }

    #[test]
    fn collection_and_stripping_are_separate_steps() {
        let tmp = TempDir::new().unwrap();
        let vendor = vec!["support".to_string()];
        let mut doc = Document::parse("<p>a</p><script>one()</script><div><script>two()</script></div>");
        let mut rewriter = AssetRewriter::new(tmp.path(), tmp.path(), tmp.path(), &vendor);

        let collected = collect_and_rewrite(&mut doc, &mut rewriter).unwrap();
        assert_eq!(collected.payloads, vec!["one()", "two()"]);
        assert!(doc.serialize().contains("one()"));

        strip_scripts(&mut doc, &collected);
        for &text in &collected.text_nodes {
            assert_eq!(doc.text(text), Some(""));
        }
        assert_eq!(doc.serialize(), "<p>a</p><div></div>");
    }

    #[test]
    fn compile_creates_missing_output_dir() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("nested/out");
        let compiler = FixtureCompiler::new(tmp.path());
        let compiled = compiler
            .compile(&tmp.path().join("a.html"), "<p>x</p>", &out, &DefaultSnapshotOptions)
            .unwrap();
        assert!(out.is_dir());
        assert_eq!(compiled.name, "a.html");
        assert!(compiled.copied.is_empty());
    }
}
