//! Unified error handling for straybot.
//!
//! Layered the same way the rest of the crate is: configuration errors,
//! plugin lifecycle errors, and a top-level `BotError` that the binary
//! reports through `anyhow`.

use thiserror::Error;

/// Configuration document errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A dotted path did not resolve to a value.
    #[error("config key missing: {0}")]
    KeyMissing(String),

    /// A dotted path traversed a value that is not a table.
    #[error("config path {path:?}: segment {segment:?} is not a table")]
    TypeMismatch { path: String, segment: String },

    /// A config document has no backing file to persist to.
    #[error("config document has no backing file")]
    NoBackingFile,
}

impl ConfigError {
    /// True for the "key absent" case, as opposed to a structural error.
    pub fn is_missing(&self) -> bool {
        matches!(self, ConfigError::KeyMissing(_))
    }
}

/// Plugin lifecycle errors.
#[derive(Debug, Error)]
pub enum PluginError {
    /// No factory registered under the requested name.
    #[error("unknown plugin: {0}")]
    UnknownPlugin(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A plugin failed while starting.
    #[error("plugin {name} failed to start: {detail}")]
    Start { name: String, detail: String },
}

/// Top-level bot errors.
#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Protocol(#[from] stray_proto::ProtocolError),

    /// Socket-level failure; the client reconnects after these.
    #[error("connection error: {0}")]
    Connection(String),
}
