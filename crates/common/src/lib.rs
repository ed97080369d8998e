//! Specrig Common Library
//!
//! Configuration, glob matching and scope resolution shared by the fixture
//! compiler, the orchestrator and the CLI.

pub mod config;
pub mod env;
pub mod error;
pub mod glob;
pub mod scope;

// Re-export commonly used types
pub use config::{
    CommandSpec, GroupSelection, HarnessConfig, PlatformTable, ScopeDefinition, SpecGroup,
};
pub use error::{Error, Result};
pub use glob::GlobPattern;
pub use scope::{resolve, BootstrapEntries, ResolvedFileSet, ScopeResolver, SubstringFilter};

/// Specrig version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
