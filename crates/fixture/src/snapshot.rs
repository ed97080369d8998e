//! Capture policy
//!
//! The compiler asks a [`SnapshotOptionsProvider`] which element a fixture
//! captures and whether it must wait for a deferred paint before doing so.

use std::path::{Path, PathBuf};

use serde::Serialize;
use specrig_common::config::FixtureConfig;
use specrig_common::glob::{relative_slash, GlobPattern};

use crate::error::FixtureResult;

/// What a capture records
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SnapshotTarget {
    /// The document element
    Root,
    /// A JS expression evaluating to the element, e.g. `document.body`
    Element(String),
}

impl SnapshotTarget {
    pub fn body() -> Self {
        SnapshotTarget::Element("document.body".to_string())
    }

    /// Expression passed as the capture target (`null` means the root)
    pub fn expression(&self) -> &str {
        match self {
            SnapshotTarget::Root => "null",
            SnapshotTarget::Element(expr) => expr,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotOptions {
    pub target: SnapshotTarget,
    pub settle_delay: bool,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            target: SnapshotTarget::Root,
            settle_delay: false,
        }
    }
}

pub trait SnapshotOptionsProvider {
    fn options_for(&self, fixture: &Path) -> SnapshotOptions;
}

impl<F> SnapshotOptionsProvider for F
where
    F: Fn(&Path) -> SnapshotOptions,
{
    fn options_for(&self, fixture: &Path) -> SnapshotOptions {
        self(fixture)
    }
}

/// Root capture, no delay, for every fixture
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSnapshotOptions;

impl SnapshotOptionsProvider for DefaultSnapshotOptions {
    fn options_for(&self, _fixture: &Path) -> SnapshotOptions {
        SnapshotOptions::default()
    }
}

/// Glob-driven policy from the `[fixture]` config section
#[derive(Debug, Clone)]
pub struct ConfiguredSnapshotOptions {
    test_root: PathBuf,
    body: Vec<GlobPattern>,
    settle: Vec<GlobPattern>,
}

impl ConfiguredSnapshotOptions {
    pub fn from_config(config: &FixtureConfig, test_root: &Path) -> FixtureResult<Self> {
        let compile = |patterns: &[String]| {
            patterns
                .iter()
                .map(|p| GlobPattern::new(p))
                .collect::<specrig_common::Result<Vec<_>>>()
        };
        Ok(Self {
            test_root: test_root.to_path_buf(),
            body: compile(&config.body_snapshot)?,
            settle: compile(&config.settle_delay)?,
        })
    }
}

impl SnapshotOptionsProvider for ConfiguredSnapshotOptions {
    fn options_for(&self, fixture: &Path) -> SnapshotOptions {
        let Some(relative) = relative_slash(&self.test_root, fixture) else {
            return SnapshotOptions::default();
        };
        SnapshotOptions {
            target: if self.body.iter().any(|g| g.is_match(&relative)) {
                SnapshotTarget::body()
            } else {
                SnapshotTarget::Root
            },
            settle_delay: self.settle.iter().any(|g| g.is_match(&relative)),
        }
    }
}
