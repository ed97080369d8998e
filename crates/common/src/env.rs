//! Environment variable names shared by the CLI, the bundler bridge and the
//! spawned test binary.

/// Scope selector read by `specrig resolve`
pub const SCOPE: &str = "SPECRIG_SCOPE";

/// `|`-delimited substring filter narrowing a resolved scope
pub const FILTER: &str = "SPECRIG_FILTER";

/// Feature switch forwarded to the bundler and the test binary
pub const ENABLE_FEATURE_X: &str = "SPECRIG_ENABLE_FEATURE_X";

/// Bundler optimization level only
pub const PRODUCTION: &str = "SPECRIG_PRODUCTION";

/// Produced for the child: test mode is on
pub const TEST_MODE: &str = "SPECRIG_TEST_MODE";

/// Produced for the child: port the capture server listens on
pub const CAPTURE_PORT: &str = "SPECRIG_CAPTURE_PORT";

/// Produced for the child: test root directory
pub const TEST_ROOT: &str = "SPECRIG_TEST_ROOT";

/// Produced for the child: test name filter
pub const NAME_FILTER: &str = "SPECRIG_NAME_FILTER";

/// Truthy values accepted for boolean flags
pub fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Read a boolean flag from the process environment
pub fn flag(name: &str) -> bool {
    std::env::var(name).map(|v| is_truthy(&v)).unwrap_or(false)
}
