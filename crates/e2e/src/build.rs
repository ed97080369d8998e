//! Bundler and native build steps
//!
//! Both steps run to completion with inherited stdio before anything is
//! launched. A failing step aborts the run; nothing is retried.

use std::path::Path;
use std::process::Stdio;

use specrig_common::config::CommandSpec;
use specrig_common::glob::to_slash;
use specrig_common::{env, HarnessConfig, SubstringFilter};
use tokio::process::Command;
use tracing::info;

use crate::error::{E2eError, E2eResult};
use crate::platform::Platform;

pub const BUNDLER_STEP: &str = "bundler";
pub const NATIVE_STEP: &str = "native build";

/// Forward-slash form of a filter file, relative to the workspace root when
/// it points inside it
pub fn normalize_filter_file(workspace_root: &Path, file: &str) -> String {
    let path = Path::new(file);
    if path.is_absolute() {
        if let Ok(relative) = path.strip_prefix(workspace_root) {
            return to_slash(relative);
        }
    }
    file.replace('\\', "/")
}

/// `|`-joined substring filter for the bundler, `None` when no files are given
pub fn derive_filter(workspace_root: &Path, filter_files: &[String]) -> Option<String> {
    if filter_files.is_empty() {
        return None;
    }
    Some(SubstringFilter::join(
        filter_files.iter().map(|f| normalize_filter_file(workspace_root, f)),
    ))
}

/// Bundler invocation for one session
#[derive(Debug, Clone)]
pub struct BundlerStep<'a> {
    config: &'a HarnessConfig,
    filter: Option<String>,
    enable_feature_x: bool,
    production: bool,
}

impl<'a> BundlerStep<'a> {
    pub fn new(config: &'a HarnessConfig, filter_files: &[String], enable_feature_x: bool) -> Self {
        Self {
            config,
            filter: derive_filter(&config.paths.workspace_root, filter_files),
            enable_feature_x,
            production: env::flag(env::PRODUCTION),
        }
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    pub fn command(&self) -> Command {
        let mut spec = self.config.bundler.command.clone();
        if self.production {
            spec.args.extend(self.config.bundler.production_args.iter().cloned());
        }

        let mut cmd = command_in(&spec, &self.config.paths.workspace_root);
        if let Some(filter) = &self.filter {
            cmd.env(env::FILTER, filter);
        }
        if self.enable_feature_x {
            cmd.env(env::ENABLE_FEATURE_X, "true");
        }
        if self.production {
            cmd.env(env::PRODUCTION, "true");
        }
        cmd
    }

    pub async fn run(&self) -> E2eResult<()> {
        match &self.filter {
            Some(filter) => info!("Bundling fixtures matching '{}'", filter),
            None => info!("Bundling all fixtures in scope"),
        }
        run_step(BUNDLER_STEP, &self.config.bundler.command, self.command()).await
    }
}

/// Native build of the host test application for `platform`
pub async fn run_native_build(config: &HarnessConfig, platform: Platform) -> E2eResult<()> {
    let spec = platform.pick(&config.native.build);
    info!("Building host application for {}", platform);
    run_step(NATIVE_STEP, spec, command_in(spec, &config.paths.workspace_root)).await
}

fn command_in(spec: &CommandSpec, dir: &Path) -> Command {
    let mut cmd = Command::from(spec.to_command());
    cmd.current_dir(dir)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    cmd
}

async fn run_step(step: &str, spec: &CommandSpec, mut cmd: Command) -> E2eResult<()> {
    info!("Running {}: {}", step, spec.display());
    let status = cmd.status().await.map_err(|source| E2eError::Spawn {
        program: spec.program.clone().into(),
        source,
    })?;
    if !status.success() {
        return Err(E2eError::build_failed(step, status));
    }
    Ok(())
}
