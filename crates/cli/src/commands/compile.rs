//! `specrig compile`: turn one markup fixture into its generated test module

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use specrig_common::HarnessConfig;
use specrig_fixture::{ConfiguredSnapshotOptions, FixtureCompiler};
use tracing::info;

#[derive(Args, Debug, Clone)]
pub struct CompileArgs {
    /// Markup fixture to compile
    pub fixture: PathBuf,

    /// Build output directory for copied resources (defaults to the configured one)
    #[arg(long)]
    pub out: Option<PathBuf>,
}

pub fn execute(args: CompileArgs, config: &HarnessConfig) -> anyhow::Result<String> {
    let fixture = if args.fixture.is_absolute() {
        args.fixture
    } else {
        std::env::current_dir()?.join(args.fixture)
    };
    let out = args.out.unwrap_or_else(|| config.paths.build_output_dir.clone());
    let test_root = &config.paths.test_root;

    let provider = ConfiguredSnapshotOptions::from_config(&config.fixture, test_root)?;
    let compiled = FixtureCompiler::from_config(&config.fixture, test_root.clone())
        .compile_file(&fixture, &out, &provider)
        .with_context(|| format!("compiling {}", fixture.display()))?;

    info!(
        "{}: {} script(s), {} asset(s) copied",
        compiled.name,
        compiled.scripts.len(),
        compiled.copied.len()
    );
    Ok(compiled.module_text)
}
