//! Output formatting for CLI

use clap::ValueEnum;
use specrig_common::ResolvedFileSet;

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// One entry per line
    #[default]
    Plain,
    /// JSON document
    Json,
}

/// Render a resolved entry list; plain output is bootstrap entries then fixtures
pub fn render_entries(set: &ResolvedFileSet, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Plain => Ok(set
            .entries()
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join("\n")),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(set)?),
    }
}
