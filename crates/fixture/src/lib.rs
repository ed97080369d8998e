//! specrig fixture compiler
//!
//! Compiles markup fixtures into generated test modules:
//! - Permissive markup parsing ([`markup`])
//! - Script extraction and replay ([`compiler`], [`codegen`])
//! - Vendored resource copying and reference rewriting ([`assets`], [`css`])
//! - Pluggable capture policy ([`snapshot`])

pub mod assets;
pub mod codegen;
pub mod compiler;
pub mod css;
pub mod error;
pub mod markup;
pub mod snapshot;

pub use assets::CopiedAssetSet;
pub use codegen::{ExecutionMode, SETTLE_DELAY_MS, TEST_TIMEOUT_MS};
pub use compiler::{CompiledFixture, FixtureCompiler};
pub use error::{FixtureError, FixtureResult};
pub use markup::Document;
pub use snapshot::{
    ConfiguredSnapshotOptions, DefaultSnapshotOptions, SnapshotOptions, SnapshotOptionsProvider, SnapshotTarget,
};
