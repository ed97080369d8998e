//! `specrig run`: build the bundle, launch the test binary, report its exit code

use clap::builder::BoolishValueParser;
use clap::Args;
use once_cell::sync::Lazy;
use regex::Regex;
use specrig_common::{env, HarnessConfig};
use specrig_e2e::{Orchestrator, RunOptions};
use tracing::debug;

/// Positional arguments that narrow the run to specific fixtures
static FILTER_FILE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^specs/.+\.(ts|tsx|js|html)$").expect("valid filter file regex"));

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Fixture files to run (`specs/...{ts,tsx,js,html}`); other values are ignored
    pub files: Vec<String>,

    /// Only run tests whose name matches
    #[arg(long)]
    pub filter: Option<String>,

    /// Enable feature X in the bundle and the test binary
    #[arg(long, env = env::ENABLE_FEATURE_X, value_parser = BoolishValueParser::new())]
    pub enable_feature_x: bool,

    /// Skip the native build of the host application
    #[arg(long)]
    pub skip_build: bool,

    /// Keep the test binary running until interrupted
    #[arg(long)]
    pub watch: bool,

    /// Overwrite mismatching snapshot baselines
    #[arg(long)]
    pub update_baselines: bool,
}

impl RunArgs {
    /// Positional arguments that look like fixture paths, normalized to `/`
    pub fn filter_files(&self) -> Vec<String> {
        self.files
            .iter()
            .map(|f| f.replace('\\', "/"))
            .filter(|f| {
                let keep = FILTER_FILE_RE.is_match(f);
                if !keep {
                    debug!("Ignoring argument '{}'", f);
                }
                keep
            })
            .collect()
    }

    pub fn options(&self) -> RunOptions {
        RunOptions {
            filter_files: self.filter_files(),
            name_filter: self.filter.clone().filter(|f| !f.is_empty()),
            enable_feature_x: self.enable_feature_x,
            skip_build: self.skip_build,
            watch: self.watch,
        }
    }
}

pub async fn execute(args: RunArgs, mut config: HarnessConfig) -> i32 {
    if args.update_baselines {
        config.server.update_baselines = true;
    }
    Orchestrator::new(config).execute(args.options()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("specs/a.ts", true ; "ts")]
    #[test_case("specs/dom/b.tsx", true ; "tsx nested")]
    #[test_case("specs/c.js", true ; "js")]
    #[test_case("specs/css/d.html", true ; "html")]
    #[test_case("specs\\css\\e.html", true ; "windows separators")]
    #[test_case("other/a.ts", false ; "outside specs")]
    #[test_case("specs/a.css", false ; "wrong extension")]
    #[test_case("specs/.ts", false ; "no name")]
    #[test_case("--verbose", false ; "flag like")]
    fn filter_file_selection(arg: &str, kept: bool) {
        let args = RunArgs {
            files: vec![arg.to_string()],
            ..RunArgs::default()
        };
        assert_eq!(args.filter_files().len(), usize::from(kept));
    }

    #[test]
    fn options_carry_flags() {
        let args = RunArgs {
            files: vec!["specs/a.ts".to_string(), "README.md".to_string(), "specs/b.ts".to_string()],
            filter: Some("layout".to_string()),
            skip_build: true,
            ..RunArgs::default()
        };
        let options = args.options();
        assert_eq!(options.filter_files, vec!["specs/a.ts", "specs/b.ts"]);
        assert_eq!(options.name_filter.as_deref(), Some("layout"));
        assert!(options.skip_build);
        assert!(!options.watch);
    }

    #[derive(clap::Parser, Debug)]
    struct Wrapper {
        #[command(flatten)]
        run: RunArgs,
    }

    #[test]
    fn feature_flag_env_accepts_the_same_truthy_values_as_other_flags() {
        use clap::Parser;

        for (value, expected) in [("1", true), ("yes", true), ("on", true), ("true", true), ("0", false), ("off", false)] {
            std::env::set_var(env::ENABLE_FEATURE_X, value);
            let parsed = Wrapper::try_parse_from(["specrig"]);
            std::env::remove_var(env::ENABLE_FEATURE_X);
            let parsed = parsed.unwrap_or_else(|e| panic!("{value}: {e}"));
            assert_eq!(parsed.run.enable_feature_x, expected, "{value}");
            assert_eq!(env::is_truthy(value), expected, "{value}");
        }

        let parsed = Wrapper::try_parse_from(["specrig", "--enable-feature-x"]).unwrap();
        assert!(parsed.run.enable_feature_x);
    }
}
