//! Harness configuration
//!
//! Loaded from `specrig.toml`. Every section has defaults so a missing file
//! (or a missing section) still yields a usable configuration.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};
use crate::scope::BootstrapEntries;

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "specrig.toml";

/// Top-level harness configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub paths: PathsConfig,
    pub bootstrap: BootstrapConfig,
    pub scopes: Vec<ScopeDefinition>,
    pub groups: Vec<SpecGroup>,
    pub fixture: FixtureConfig,
    pub bundler: BundlerConfig,
    pub native: NativeConfig,
    pub server: ServerConfig,
}

/// A named selection of fixtures for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeDefinition {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Group references; `"*"` selects every group
    #[serde(default)]
    pub groups: Option<GroupSelection>,

    /// Extra glob patterns appended after the group patterns
    #[serde(default)]
    pub include: Vec<String>,

    /// Glob patterns removed after all inclusion sources are unioned
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// A reusable bundle of glob patterns, relative to the test root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecGroup {
    pub name: String,
    pub specs: Vec<String>,
}

/// Which groups a scope pulls in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawGroups", into = "RawGroups")]
pub enum GroupSelection {
    All,
    Named(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawGroups {
    One(String),
    Many(Vec<String>),
}

impl From<RawGroups> for GroupSelection {
    fn from(raw: RawGroups) -> Self {
        match raw {
            RawGroups::One(name) if name == "*" => GroupSelection::All,
            RawGroups::One(name) => GroupSelection::Named(vec![name]),
            RawGroups::Many(names) => GroupSelection::Named(names),
        }
    }
}

impl From<GroupSelection> for RawGroups {
    fn from(selection: GroupSelection) -> Self {
        match selection {
            GroupSelection::All => RawGroups::One("*".to_string()),
            GroupSelection::Named(names) => RawGroups::Many(names),
        }
    }
}

/// Filesystem layout. Relative paths are resolved against the config file's directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root used to relativize filter files handed to the orchestrator
    pub workspace_root: PathBuf,

    /// Directory that scope and group globs are relative to
    pub test_root: PathBuf,

    /// Where generated modules and copied assets land
    pub build_output_dir: PathBuf,

    /// Capture baselines
    pub snapshot_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("."),
            test_root: PathBuf::from("specs"),
            build_output_dir: PathBuf::from(".build"),
            snapshot_dir: PathBuf::from("snapshots"),
        }
    }
}

impl PathsConfig {
    fn absolutize(&mut self, base: &Path) {
        for path in [
            &mut self.workspace_root,
            &mut self.test_root,
            &mut self.build_output_dir,
            &mut self.snapshot_dir,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

/// Setup modules placed ahead of every fixture
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub reset: PathBuf,
    pub global_setup: PathBuf,
    pub host_shim: PathBuf,

    /// Include the host shim (targeting the specialized host)
    pub include_host_shim: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            reset: PathBuf::from("runtime/reset.ts"),
            global_setup: PathBuf::from("runtime/global.ts"),
            host_shim: PathBuf::from("runtime/host_shim.ts"),
            include_host_shim: false,
        }
    }
}

/// Fixture compiler knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureConfig {
    /// Directory names marking a vendored resource subtree
    pub vendor_dirs: Vec<String>,

    /// Fixtures (globs relative to the test root) captured from `document.body`
    pub body_snapshot: Vec<String>,

    /// Fixtures that wait for a deferred layout/paint pass before capturing
    pub settle_delay: Vec<String>,

    /// Host binding that parses markup into the live tree
    pub parse_binding: String,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            vendor_dirs: vec!["resources".to_string(), "support".to_string()],
            body_snapshot: Vec::new(),
            settle_delay: Vec::new(),
            parse_binding: "__parse_html__".to_string(),
        }
    }
}

/// A program plus arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Build a synchronous command
    pub fn to_command(&self) -> std::process::Command {
        let mut cmd = std::process::Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }

    /// Shell-ish rendering for logs
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Bundler invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BundlerConfig {
    pub command: CommandSpec,

    /// Appended when the production flag is set in the environment
    pub production_args: Vec<String>,
}

impl Default for BundlerConfig {
    fn default() -> Self {
        Self {
            command: CommandSpec::new("npx", &["webpack", "--config", "webpack.config.js"]),
            production_args: vec!["--mode".to_string(), "production".to_string()],
        }
    }
}

/// One value per supported host platform
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformTable<T> {
    pub linux: T,
    pub macos: T,
    pub windows: T,
}

/// Native host application build and launch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeConfig {
    /// Executable name of the host test application
    pub app_name: String,

    /// Native build output root, relative to the workspace root
    pub build_dir: PathBuf,

    /// Skip platform path derivation and launch this binary
    pub binary_override: Option<PathBuf>,

    /// Arguments passed to the host binary on launch
    pub launch_args: Vec<String>,

    pub build: PlatformTable<CommandSpec>,

    /// Rendering backend hints added to the child environment
    pub backend_hints: PlatformTable<BTreeMap<String, String>>,
}

impl Default for NativeConfig {
    fn default() -> Self {
        let mut linux_hints = BTreeMap::new();
        linux_hints.insert("LIBGL_ALWAYS_SOFTWARE".to_string(), "true".to_string());
        let mut macos_hints = BTreeMap::new();
        macos_hints.insert("FLUTTER_ENGINE_SWITCH_1".to_string(), "enable-impeller=false".to_string());

        Self {
            app_name: "app".to_string(),
            build_dir: PathBuf::from("build"),
            binary_override: None,
            launch_args: Vec::new(),
            build: PlatformTable {
                linux: CommandSpec::new("flutter", &["build", "linux", "--debug"]),
                macos: CommandSpec::new("flutter", &["build", "macos", "--debug"]),
                windows: CommandSpec::new("flutter", &["build", "windows", "--debug"]),
            },
            backend_hints: PlatformTable {
                linux: linux_hints,
                macos: macos_hints,
                windows: BTreeMap::new(),
            },
        }
    }
}

/// Companion capture server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,

    /// Inclusive port range the session port is drawn from
    pub port_min: u16,
    pub port_max: u16,

    /// Fresh random ports tried when binding fails with address-in-use
    pub bind_attempts: usize,

    /// Overwrite mismatching baselines instead of failing them
    pub update_baselines: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port_min: 11000,
            port_max: 14000,
            bind_attempts: 5,
            update_baselines: false,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from file, falling back to defaults when it is absent
    pub fn load(path: &Path) -> Result<Self> {
        let base = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml(&content)?
        } else {
            debug!("No config at {}, using defaults", path.display());
            Self::default()
        };

        let base = if base.is_absolute() {
            base
        } else {
            std::env::current_dir()?.join(base)
        };
        config.paths.absolutize(&base);
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject inconsistent tables early instead of failing mid-run
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for group in &self.groups {
            if !seen.insert(group.name.as_str()) {
                return Err(Error::InvalidConfig(format!("duplicate group '{}'", group.name)));
            }
        }

        let mut scopes = HashSet::new();
        for scope in &self.scopes {
            if scope.name == crate::scope::ALL_SCOPE {
                return Err(Error::InvalidConfig(format!(
                    "scope name '{}' is reserved",
                    crate::scope::ALL_SCOPE
                )));
            }
            if !scopes.insert(scope.name.as_str()) {
                return Err(Error::InvalidConfig(format!("duplicate scope '{}'", scope.name)));
            }
            if let Some(GroupSelection::Named(names)) = &scope.groups {
                for name in names {
                    if !seen.contains(name.as_str()) {
                        return Err(Error::UnknownGroup {
                            scope: scope.name.clone(),
                            group: name.clone(),
                            known: self.groups.iter().map(|g| g.name.clone()).collect(),
                        });
                    }
                }
            }
        }

        if self.server.port_min > self.server.port_max {
            return Err(Error::InvalidConfig(format!(
                "port range {}-{} is empty",
                self.server.port_min, self.server.port_max
            )));
        }
        if self.server.bind_attempts == 0 {
            return Err(Error::InvalidConfig("server.bind_attempts must be at least 1".to_string()));
        }

        Ok(())
    }

    /// Bootstrap entries as absolute paths under the workspace root
    pub fn bootstrap_entries(&self, host_shim: bool) -> BootstrapEntries {
        let root = &self.paths.workspace_root;
        BootstrapEntries {
            reset: root.join(&self.bootstrap.reset),
            global_setup: root.join(&self.bootstrap.global_setup),
            host_shim: (host_shim || self.bootstrap.include_host_shim)
                .then(|| root.join(&self.bootstrap.host_shim)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
[paths]
test_root = "integration_tests/specs"

[[groups]]
name = "layout"
specs = ["css/*.html"]

[[groups]]
name = "dom"
specs = ["dom/**/*.ts"]

[[scopes]]
name = "css"
description = "layout only"
groups = ["layout"]
exclude = ["css/broken-*.html"]

[[scopes]]
name = "every"
groups = "*"

[[scopes]]
name = "single"
groups = "dom"
include = ["extra/*.ts"]
"#;

    #[test]
    fn parses_group_selection_shapes() {
        let config = HarnessConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.scopes.len(), 3);
        assert_eq!(
            config.scopes[0].groups,
            Some(GroupSelection::Named(vec!["layout".to_string()]))
        );
        assert_eq!(config.scopes[1].groups, Some(GroupSelection::All));
        assert_eq!(
            config.scopes[2].groups,
            Some(GroupSelection::Named(vec!["dom".to_string()]))
        );
        assert_eq!(config.scopes[2].include, vec!["extra/*.ts"]);
        assert_eq!(config.server.port_min, 11000);
    }

    #[test]
    fn unknown_group_is_rejected_at_load() {
        let text = r#"
[[scopes]]
name = "css"
groups = ["missing"]
"#;
        let err = HarnessConfig::from_toml(text).unwrap_err();
        assert!(matches!(err, Error::UnknownGroup { ref group, .. } if group == "missing"));
    }

    #[test]
    fn reserved_and_duplicate_names_are_rejected() {
        let reserved = "[[scopes]]\nname = \"all\"\n";
        assert!(matches!(
            HarnessConfig::from_toml(reserved),
            Err(Error::InvalidConfig(_))
        ));

        let duplicate = "[[groups]]\nname = \"a\"\nspecs = []\n[[groups]]\nname = \"a\"\nspecs = []\n";
        assert!(matches!(
            HarnessConfig::from_toml(duplicate),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn empty_port_range_is_rejected() {
        let text = "[server]\nport_min = 14000\nport_max = 11000\n";
        assert!(HarnessConfig::from_toml(text).is_err());
    }

    #[test]
    fn zero_bind_attempts_is_rejected() {
        let text = "[server]\nbind_attempts = 0\n";
        assert!(matches!(
            HarnessConfig::from_toml(text),
            Err(Error::InvalidConfig(msg)) if msg.contains("bind_attempts")
        ));
        assert!(HarnessConfig::from_toml("[server]\nbind_attempts = 1\n").is_ok());
    }

    #[test]
    fn load_missing_file_uses_defaults_relative_to_config_dir() {
        let tmp = TempDir::new().unwrap();
        let config = HarnessConfig::load(&tmp.path().join("specrig.toml")).unwrap();
        assert!(config.scopes.is_empty());
        assert_eq!(config.paths.test_root, tmp.path().join("specs"));
        assert_eq!(config.fixture.vendor_dirs, vec!["resources", "support"]);
    }

    #[test]
    fn group_selection_round_trips_through_toml() {
        let config = HarnessConfig::from_toml(SAMPLE).unwrap();
        let text = toml::to_string(&config).unwrap();
        let again = HarnessConfig::from_toml(&text).unwrap();
        assert_eq!(again.scopes[1].groups, Some(GroupSelection::All));
    }

    #[test]
    fn bootstrap_entries_respect_host_shim_switch() {
        let mut config = HarnessConfig::default();
        config.paths.workspace_root = PathBuf::from("/ws");
        let plain = config.bootstrap_entries(false);
        assert_eq!(plain.reset, PathBuf::from("/ws/runtime/reset.ts"));
        assert!(plain.host_shim.is_none());

        let hosted = config.bootstrap_entries(true);
        assert_eq!(hosted.host_shim, Some(PathBuf::from("/ws/runtime/host_shim.ts")));
    }
}
