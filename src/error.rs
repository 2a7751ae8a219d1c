//! Error types shared across components
//!
//! Each failure mode the daemon can hit gets its own enum so callers can
//! decide whether to surface, log, or absorb it. Application plumbing
//! (startup, CLI commands) wraps these in `anyhow` with context.

use thiserror::Error;

/// Subscribing to an event source failed
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConnectError {
    /// The source does not declare the signal, or it has already been disposed
    #[error("source does not support subscribing to `{signal}`")]
    InvalidSource { signal: String },
}

/// Topology query failed or returned data we could not interpret
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("display configuration query failed: {0}")]
    Dbus(#[from] zbus::Error),

    #[error("malformed display configuration: {0}")]
    Malformed(String),
}

/// A settings store could not be read or written
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to run gsettings: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("gsettings {action} {schema} {key} failed: {stderr}")]
    Command {
        action: &'static str,
        schema: String,
        key: String,
        stderr: String,
    },

    #[error("unexpected value for {schema} {key}: {value}")]
    Parse {
        schema: String,
        key: String,
        value: String,
    },
}

/// Profile mutation or construction failed
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("profile index {index} out of range (have {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("profile name must not be empty")]
    EmptyName,

    #[error("font scale factor must be a positive number, got {0}")]
    InvalidScaleFactor(f64),

    #[error("failed to encode profiles: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to persist profiles: {0}")]
    Persist(#[from] SettingsError),
}

/// The persisted `profiles` setting could not be turned into profiles
#[derive(Debug, Error)]
pub enum PersistedDataError {
    #[error("profiles setting is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("profiles setting must be a JSON object, found {found}")]
    NotAnObject { found: &'static str },

    #[error("stored profile #{index} is invalid: {source}")]
    InvalidProfile {
        index: usize,
        #[source]
        source: ProfileError,
    },
}

/// The controller could not be brought up
#[derive(Debug, Error)]
pub enum EnableError {
    #[error("failed to open extension settings: {0}")]
    Settings(#[from] SettingsError),

    #[error("failed to subscribe to an event source: {0}")]
    Connect(#[from] ConnectError),
}
