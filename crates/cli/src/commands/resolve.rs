//! `specrig resolve`: print the bundler entry list for a scope

use anyhow::Context;
use clap::Args;
use specrig_common::{env, HarnessConfig, ScopeResolver, SubstringFilter};

use crate::output::{render_entries, OutputFormat};

#[derive(Args, Debug, Clone)]
pub struct ResolveArgs {
    /// Scope to resolve
    #[arg(long, env = env::SCOPE, default_value = specrig_common::scope::ALL_SCOPE)]
    pub scope: String,

    /// `|`-delimited substring filter
    #[arg(long, env = env::FILTER)]
    pub filter: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Plain)]
    pub format: OutputFormat,

    /// Include the host shim bootstrap entry
    #[arg(long)]
    pub host_shim: bool,
}

pub fn execute(args: ResolveArgs, config: &HarnessConfig) -> anyhow::Result<String> {
    let filter = SubstringFilter::parse(args.filter.as_deref().unwrap_or_default());
    let bootstrap = config.bootstrap_entries(args.host_shim);

    let set = ScopeResolver::new(&config.scopes, &config.groups, &config.paths.test_root)
        .resolve(&args.scope, &bootstrap, &filter)
        .with_context(|| format!("resolving scope '{}'", args.scope))?;

    render_entries(&set, args.format)
}
