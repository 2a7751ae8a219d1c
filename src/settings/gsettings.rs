//! GSettings through the `gsettings` command line tool
//!
//! Reads and writes shell out synchronously; they are short lived and the
//! daemon only touches settings in response to events. Change notification
//! runs `gsettings monitor` as a child process and turns each output line
//! into a `changed` emission.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::rc::Rc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::gvariant;
use super::{SettingsProvider, SettingsStore};
use crate::constants::{paths, schema, signals::CHANGED};
use crate::error::{ConnectError, SettingsError};
use crate::signals::{Handler, SignalId, Signals, Subscribable};

const SIGNAL_NAMES: &[&str] = &[CHANGED];

/// One GSettings schema, optionally loaded from a non-default schema directory
pub struct GSettings {
    schema: String,
    schema_dir: Option<PathBuf>,
    signals: Rc<Signals>,
    monitor: RefCell<Option<JoinHandle<()>>>,
}

impl GSettings {
    pub fn new(schema: &str, schema_dir: Option<PathBuf>) -> Rc<Self> {
        Rc::new(Self {
            schema: schema.to_string(),
            schema_dir,
            signals: Rc::new(Signals::new(SIGNAL_NAMES)),
            monitor: RefCell::new(None),
        })
    }

    /// Start emitting `changed` for every key change in this schema.
    ///
    /// Must be called from inside a `tokio::task::LocalSet`. Calling it again
    /// while a monitor is running does nothing.
    pub fn watch(&self) -> Result<(), SettingsError> {
        if self.monitor.borrow().as_ref().is_some_and(|h| !h.is_finished()) {
            return Ok(());
        }

        let mut command = tokio::process::Command::new(paths::GSETTINGS_BIN);
        if let Some(dir) = &self.schema_dir {
            command.arg("--schemadir").arg(dir);
        }
        command
            .args(["monitor", &self.schema])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = command.spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SettingsError::Spawn(std::io::Error::other("gsettings monitor has no stdout")))?;

        let signals = Rc::downgrade(&self.signals);
        let schema = self.schema.clone();
        let handle = tokio::task::spawn_local(async move {
            // Owned by the task so aborting it kills the child
            let _child = child;
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let key = line.split(':').next().unwrap_or_default().trim();
                        debug!(schema = %schema, key = key, "setting changed");
                        let Some(signals) = signals.upgrade() else {
                            break;
                        };
                        signals.emit(CHANGED);
                    }
                    Ok(None) => {
                        warn!(schema = %schema, "gsettings monitor exited");
                        break;
                    }
                    Err(e) => {
                        warn!(schema = %schema, error = %e, "failed to read gsettings monitor output");
                        break;
                    }
                }
            }
        });

        info!(schema = %self.schema, "watching settings");
        *self.monitor.borrow_mut() = Some(handle);
        Ok(())
    }

    fn command(&self) -> Command {
        let mut command = Command::new(paths::GSETTINGS_BIN);
        if let Some(dir) = &self.schema_dir {
            command.arg("--schemadir").arg(dir);
        }
        command.stdin(Stdio::null());
        command
    }

    fn get_raw(&self, key: &str) -> Result<String, SettingsError> {
        let output = self.command().args(["get", &self.schema, key]).output()?;
        if !output.status.success() {
            return Err(SettingsError::Command {
                action: "get",
                schema: self.schema.clone(),
                key: key.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn set_raw(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        let output = self.command().args(["set", &self.schema, key, value]).output()?;
        if !output.status.success() {
            return Err(SettingsError::Command {
                action: "set",
                schema: self.schema.clone(),
                key: key.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        debug!(schema = %self.schema, key = key, "setting written");
        Ok(())
    }

    fn get_parsed<T>(&self, key: &str, parse: impl FnOnce(&str) -> Option<T>) -> Result<T, SettingsError> {
        let raw = self.get_raw(key)?;
        parse(&raw).ok_or_else(|| SettingsError::Parse {
            schema: self.schema.clone(),
            key: key.to_string(),
            value: raw,
        })
    }
}

impl Drop for GSettings {
    fn drop(&mut self) {
        if let Some(handle) = self.monitor.get_mut().take() {
            handle.abort();
        }
    }
}

impl Subscribable for GSettings {
    fn connect(&self, signal: &str, handler: Handler) -> Result<SignalId, ConnectError> {
        self.signals.connect(signal, handler)
    }

    fn disconnect(&self, id: SignalId) {
        self.signals.disconnect(id);
    }
}

impl SettingsStore for GSettings {
    fn boolean(&self, key: &str) -> Result<bool, SettingsError> {
        self.get_parsed(key, gvariant::parse_bool)
    }

    fn double(&self, key: &str) -> Result<f64, SettingsError> {
        self.get_parsed(key, gvariant::parse_double)
    }

    fn int(&self, key: &str) -> Result<i32, SettingsError> {
        self.get_parsed(key, gvariant::parse_int)
    }

    fn string(&self, key: &str) -> Result<String, SettingsError> {
        self.get_parsed(key, gvariant::parse_string)
    }

    fn set_boolean(&self, key: &str, value: bool) -> Result<(), SettingsError> {
        self.set_raw(key, &gvariant::format_bool(value))
    }

    fn set_double(&self, key: &str, value: f64) -> Result<(), SettingsError> {
        self.set_raw(key, &gvariant::format_double(value))
    }

    fn set_int(&self, key: &str, value: i32) -> Result<(), SettingsError> {
        self.set_raw(key, &gvariant::format_int(value))
    }

    fn set_string(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        self.set_raw(key, &gvariant::quote_string(value))
    }
}

/// Opens schemas with `gsettings`. Only this daemon's own schema is looked up
/// in `extension_schema_dir`; system schemas come from the default search path.
pub struct GSettingsProvider {
    extension_schema_dir: Option<PathBuf>,
}

impl GSettingsProvider {
    pub fn new(extension_schema_dir: Option<PathBuf>) -> Self {
        if let Some(dir) = &extension_schema_dir {
            info!(path = %dir.display(), "using extension schema directory");
        }
        Self { extension_schema_dir }
    }

    fn create(&self, schema_id: &str) -> Rc<GSettings> {
        let dir = (schema_id == schema::EXTENSION)
            .then(|| self.extension_schema_dir.clone())
            .flatten();
        GSettings::new(schema_id, dir)
    }
}

impl SettingsProvider for GSettingsProvider {
    fn open(&self, schema_id: &str) -> Rc<dyn SettingsStore> {
        self.create(schema_id)
    }

    fn open_watched(&self, schema_id: &str) -> Result<Rc<dyn SettingsStore>, SettingsError> {
        let settings = self.create(schema_id);
        settings.watch()?;
        Ok(settings)
    }
}

/// Locate a directory holding the compiled schema for this daemon.
///
/// An explicit directory wins. Otherwise the per-user and system extension
/// install locations are probed; `None` means the default GSettings search
/// path should be used.
pub fn find_extension_schema_dir(explicit: Option<PathBuf>) -> Option<PathBuf> {
    if explicit.is_some() {
        return explicit;
    }

    let mut roots: Vec<PathBuf> = Vec::new();
    if let Some(data_dir) = dirs::data_dir() {
        roots.push(data_dir);
    }
    roots.push(PathBuf::from("/usr/local/share"));
    roots.push(PathBuf::from("/usr/share"));

    roots
        .into_iter()
        .map(|root| extension_schema_dir(&root))
        .find(|dir| dir.join(paths::COMPILED_SCHEMAS).is_file())
}

fn extension_schema_dir(data_root: &Path) -> PathBuf {
    data_root
        .join("gnome-shell")
        .join("extensions")
        .join(paths::EXTENSION_UUID)
        .join("schemas")
}
