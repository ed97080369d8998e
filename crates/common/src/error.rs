//! Error types for specrig

use thiserror::Error;

/// Result type alias using the specrig configuration error
pub type Result<T> = std::result::Result<T, Error>;

/// Configuration and resolution errors
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Unknown scope '{name}'. Valid scopes: {}", valid.join(", "))]
    UnknownScope { name: String, valid: Vec<String> },

    #[error("Scope '{scope}' references unknown group '{group}'. Known groups: {}", known.join(", "))]
    UnknownGroup {
        scope: String,
        group: String,
        known: Vec<String>,
    },

    #[error("Invalid glob pattern '{pattern}': {reason}")]
    InvalidGlob { pattern: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Whether this error belongs to the configuration class (fatal before any spawn)
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::UnknownScope { .. }
                | Error::UnknownGroup { .. }
                | Error::InvalidGlob { .. }
                | Error::InvalidConfig(_)
                | Error::ConfigParse(_)
        )
    }
}
