//! Error types for riotbot.

use std::path::PathBuf;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors raised while loading the tutorial flow script.
///
/// These are startup errors: the bot cannot run a tutorial without a script.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("Failed to read tutorial flow file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse tutorial flow: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send message on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Template parse and substitution errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("Unclosed action starting at byte {offset}")]
    Unterminated { offset: usize },

    #[error("Unsupported template action: {{{{{action}}}}}")]
    UnsupportedAction { action: String },
}
