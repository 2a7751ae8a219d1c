//! Key/value settings stores
//!
//! - **gsettings**: GSettings access through the `gsettings` command line tool
//! - **gvariant**: GVariant text encoding for values passed to that tool
//! - **memory**: in-memory store used by tests

pub mod gsettings;
pub mod gvariant;
#[cfg(test)]
pub mod memory;

pub use gsettings::{find_extension_schema_dir, GSettingsProvider};

use std::rc::Rc;
use tracing::warn;

use crate::error::SettingsError;
use crate::signals::Subscribable;

/// A change-notifying settings schema instance. Emits `changed` on a later
/// loop turn whenever any key is written, by this process or another.
pub trait SettingsStore: Subscribable {
    fn boolean(&self, key: &str) -> Result<bool, SettingsError>;
    fn double(&self, key: &str) -> Result<f64, SettingsError>;
    fn int(&self, key: &str) -> Result<i32, SettingsError>;
    fn string(&self, key: &str) -> Result<String, SettingsError>;

    fn set_boolean(&self, key: &str, value: bool) -> Result<(), SettingsError>;
    fn set_double(&self, key: &str, value: f64) -> Result<(), SettingsError>;
    fn set_int(&self, key: &str, value: i32) -> Result<(), SettingsError>;
    fn set_string(&self, key: &str, value: &str) -> Result<(), SettingsError>;
}

/// Opens settings stores by schema id
pub trait SettingsProvider {
    /// Store for writing and on-demand reads
    fn open(&self, schema: &str) -> Rc<dyn SettingsStore>;

    /// Store that also delivers `changed` notifications
    fn open_watched(&self, schema: &str) -> Result<Rc<dyn SettingsStore>, SettingsError>;
}

/// Fall back to `default` when a key cannot be read, logging why
pub fn or_default<T: std::fmt::Debug>(result: Result<T, SettingsError>, key: &str, default: T) -> T {
    result.unwrap_or_else(|e| {
        warn!(key = key, error = %e, fallback = ?default, "unreadable setting, using default");
        default
    })
}
