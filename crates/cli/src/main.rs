//! specrig CLI - Main Entry Point
//!
//! `specrig [run] [specs/...] [flags]` builds the bundle, launches the host
//! test binary and exits with its code. `resolve` and `compile` are the two
//! hooks the bundler calls back into.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use specrig_common::config::DEFAULT_CONFIG_FILE;
use specrig_common::HarnessConfig;
use tracing::error;

mod commands;
mod output;

use commands::{compile, resolve, run};

/// specrig - fixture build and execution pipeline
#[derive(Parser, Debug)]
#[command(name = "specrig")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true, args_conflicts_with_subcommands = true)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: run::RunArgs,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build and run the suite (default)
    Run(run::RunArgs),

    /// Print the bundler entry list for a scope
    Resolve(resolve::ResolveArgs),

    /// Compile one markup fixture and print the generated module
    Compile(compile::CompileArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries resolve/compile output
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            1
        }
    };
    std::process::exit(code)
}

async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let config = HarnessConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command.unwrap_or(Commands::Run(cli.run)) {
        Commands::Run(args) => Ok(run::execute(args, config).await),
        Commands::Resolve(args) => {
            println!("{}", resolve::execute(args, &config)?);
            Ok(0)
        }
        Commands::Compile(args) => {
            print!("{}", compile::execute(args, &config)?);
            Ok(0)
        }
    }
}
