//! Stored profiles and active-profile matching
//!
//! The full profile list lives in the `profiles` string setting as
//! `{"profiles": [...]}` JSON. `ProfilesManager` keeps the parsed list in
//! memory, re-reads it on every settings change, and resolves which profile
//! (if any) matches the live monitor topology.

use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use tracing::{debug, error, info};

use crate::connections::ManagedConnections;
use crate::constants::{defaults, keys, signals::CHANGED, signals::UPDATED};
use crate::error::{ConnectError, PersistedDataError, ProfileError};
use crate::monitors::{monitor_identity, Monitor, MonitorIdentity, MonitorsConfig};
use crate::settings::{or_default, SettingsStore};
use crate::signals::{Handler, SignalId, Signals, Subscribable};

/// Unvalidated profile fields, as stored or as entered by the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSpec {
    pub name: String,
    pub font_scale_factor: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dash_to_dock_icon_size: Option<u32>,
    #[serde(default)]
    pub monitors: Vec<Monitor>,
}

/// Fields to change on an existing profile. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub font_scale_factor: Option<f64>,
    /// `Some(None)` clears the icon size
    pub dash_to_dock_icon_size: Option<Option<u32>>,
}

/// A validated profile: non-empty name, finite positive scale factor
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    name: String,
    font_scale_factor: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    dash_to_dock_icon_size: Option<u32>,
    monitors: Vec<Monitor>,
}

impl Profile {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn font_scale_factor(&self) -> f64 {
        self.font_scale_factor
    }

    pub fn dash_to_dock_icon_size(&self) -> Option<u32> {
        self.dash_to_dock_icon_size
    }

    /// Monitors captured when the profile was saved
    pub fn monitors(&self) -> &[Monitor] {
        &self.monitors
    }

    pub fn identity(&self, with_serials: bool) -> MonitorIdentity {
        monitor_identity(&self.monitors, with_serials)
    }

    /// Copy with `update` merged in. The monitor list is never touched.
    pub fn updated(&self, update: ProfileUpdate) -> Result<Self, ProfileError> {
        Self::try_from(ProfileSpec {
            name: update.name.unwrap_or_else(|| self.name.clone()),
            font_scale_factor: update.font_scale_factor.unwrap_or(self.font_scale_factor),
            dash_to_dock_icon_size: update.dash_to_dock_icon_size.unwrap_or(self.dash_to_dock_icon_size),
            monitors: self.monitors.clone(),
        })
    }
}

impl TryFrom<ProfileSpec> for Profile {
    type Error = ProfileError;

    fn try_from(spec: ProfileSpec) -> Result<Self, Self::Error> {
        if spec.name.trim().is_empty() {
            return Err(ProfileError::EmptyName);
        }
        if !spec.font_scale_factor.is_finite() || spec.font_scale_factor <= 0.0 {
            return Err(ProfileError::InvalidScaleFactor(spec.font_scale_factor));
        }
        Ok(Self {
            name: spec.name,
            font_scale_factor: spec.font_scale_factor,
            dash_to_dock_icon_size: spec.dash_to_dock_icon_size,
            monitors: spec.monitors,
        })
    }
}

#[derive(Deserialize)]
struct PersistedProfiles {
    #[serde(default)]
    profiles: Vec<ProfileSpec>,
}

#[derive(Serialize)]
struct PersistedProfilesRef<'a> {
    profiles: Vec<&'a Profile>,
}

/// Parse the `profiles` setting. Empty text is an empty list; anything
/// other than a `{"profiles": [...]}` object is rejected.
pub fn parse_profiles(text: &str) -> Result<Vec<Rc<Profile>>, PersistedDataError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let value: serde_json::Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Err(PersistedDataError::NotAnObject {
            found: json_kind(&value),
        });
    }
    let persisted: PersistedProfiles = serde_json::from_value(value)?;
    persisted
        .profiles
        .into_iter()
        .enumerate()
        .map(|(index, spec)| {
            Profile::try_from(spec)
                .map(Rc::new)
                .map_err(|source| PersistedDataError::InvalidProfile { index, source })
        })
        .collect()
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

pub fn serialize_profiles(profiles: &[Rc<Profile>]) -> Result<String, serde_json::Error> {
    serde_json::to_string(&PersistedProfilesRef {
        profiles: profiles.iter().map(|p| p.as_ref()).collect(),
    })
}

/// Cached result of the last active-profile lookup
#[derive(Debug, Clone, Default)]
pub enum ActiveProfile {
    #[default]
    Unknown,
    Resolved(Option<Rc<Profile>>),
}

const SIGNAL_NAMES: &[&str] = &[UPDATED];

/// Profile list bound to the extension settings and the live topology.
/// Emits `updated` after a successful reload and after every topology change.
pub struct ProfilesManager {
    settings: Rc<dyn SettingsStore>,
    monitors_config: Rc<MonitorsConfig>,
    profiles: RefCell<Vec<Rc<Profile>>>,
    with_serials: Cell<bool>,
    active: RefCell<ActiveProfile>,
    signals: Signals,
    connections: RefCell<ManagedConnections>,
    disposed: Cell<bool>,
}

impl ProfilesManager {
    pub fn new(
        settings: Rc<dyn SettingsStore>,
        monitors_config: Rc<MonitorsConfig>,
    ) -> Result<Rc<Self>, ConnectError> {
        let manager = Rc::new(Self {
            settings: settings.clone(),
            monitors_config: monitors_config.clone(),
            profiles: RefCell::new(Vec::new()),
            with_serials: Cell::new(defaults::WITH_SERIALS),
            active: RefCell::new(ActiveProfile::Unknown),
            signals: Signals::new(SIGNAL_NAMES),
            connections: RefCell::new(ManagedConnections::new()),
            disposed: Cell::new(false),
        });
        if let Err(e) = manager.reload() {
            error!(error = %e, "ignoring stored profiles");
        }

        let weak = Rc::downgrade(&manager);
        let mut connections = manager.connections.borrow_mut();
        connections.connect(settings, CHANGED, on_event(&weak, Self::on_settings_changed))?;
        connections.connect(monitors_config, UPDATED, on_event(&weak, Self::on_topology_updated))?;
        drop(connections);

        info!(profiles = manager.profiles.borrow().len(), "profiles loaded");
        Ok(manager)
    }

    /// Snapshot of the stored profiles, in list order
    pub fn profiles(&self) -> Vec<Rc<Profile>> {
        self.profiles.borrow().clone()
    }

    #[cfg(test)]
    pub fn with_serials(&self) -> bool {
        self.with_serials.get()
    }

    /// Current topology, as seen by the matcher
    pub fn monitors(&self) -> Vec<Monitor> {
        self.monitors_config.monitors()
    }

    /// First stored profile whose identity equals the live topology's.
    /// Cached until the next settings or topology change.
    pub fn active_profile(&self) -> Option<Rc<Profile>> {
        if let ActiveProfile::Resolved(profile) = &*self.active.borrow() {
            return profile.clone();
        }

        let with_serials = self.with_serials.get();
        let current = monitor_identity(&self.monitors_config.monitors(), with_serials);
        let found = self
            .profiles
            .borrow()
            .iter()
            .find(|profile| profile.identity(with_serials) == current)
            .cloned();

        match &found {
            Some(profile) => debug!(profile = %profile.name(), "active profile resolved"),
            None => debug!(monitors = current.len(), "no profile matches current monitors"),
        }
        *self.active.borrow_mut() = ActiveProfile::Resolved(found.clone());
        found
    }

    /// Add a profile at the end of the list and persist it.
    /// Name uniqueness is left to the caller.
    pub fn append_profile(&self, spec: ProfileSpec) -> Result<Rc<Profile>, ProfileError> {
        let profile = Rc::new(Profile::try_from(spec)?);
        let mut next = self.profiles();
        next.push(profile.clone());
        self.commit(next)?;
        info!(profile = %profile.name(), "profile added");
        Ok(profile)
    }

    pub fn update_profile(&self, index: usize, update: ProfileUpdate) -> Result<Rc<Profile>, ProfileError> {
        let mut next = self.profiles();
        let current = next.get(index).ok_or(ProfileError::IndexOutOfRange { index, len: next.len() })?;
        let profile = Rc::new(current.updated(update)?);
        next[index] = profile.clone();
        self.commit(next)?;
        info!(index = index, profile = %profile.name(), "profile updated");
        Ok(profile)
    }

    pub fn remove_profile(&self, index: usize) -> Result<Rc<Profile>, ProfileError> {
        let mut next = self.profiles();
        if index >= next.len() {
            return Err(ProfileError::IndexOutOfRange { index, len: next.len() });
        }
        let removed = next.remove(index);
        self.commit(next)?;
        info!(index = index, profile = %removed.name(), "profile removed");
        Ok(removed)
    }

    /// Release the settings and topology subscriptions, dispose the topology
    /// component and drop every `updated` handler. Safe to call repeatedly.
    pub fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        self.connections.borrow_mut().disconnect_all();
        self.monitors_config.disconnect_all();
        self.signals.dispose();
        *self.active.borrow_mut() = ActiveProfile::Unknown;
        debug!("profiles manager disposed");
    }

    /// Persist `next` and adopt it only once the write went through
    fn commit(&self, next: Vec<Rc<Profile>>) -> Result<(), ProfileError> {
        let text = serialize_profiles(&next)?;
        self.settings.set_string(keys::PROFILES, &text)?;
        *self.profiles.borrow_mut() = next;
        self.invalidate();
        Ok(())
    }

    fn reload(&self) -> Result<(), PersistedDataError> {
        self.with_serials.set(or_default(
            self.settings.boolean(keys::WITH_SERIALS),
            keys::WITH_SERIALS,
            defaults::WITH_SERIALS,
        ));
        let text = or_default(self.settings.string(keys::PROFILES), keys::PROFILES, String::new());
        let profiles = parse_profiles(&text)?;
        *self.profiles.borrow_mut() = profiles;
        Ok(())
    }

    fn invalidate(&self) {
        *self.active.borrow_mut() = ActiveProfile::Unknown;
    }

    fn on_settings_changed(&self) {
        self.invalidate();
        match self.reload() {
            Ok(()) => self.signals.emit(UPDATED),
            Err(e) => error!(error = %e, "keeping previous profiles"),
        }
    }

    fn on_topology_updated(&self) {
        self.invalidate();
        self.signals.emit(UPDATED);
    }
}

fn on_event(weak: &Weak<ProfilesManager>, f: fn(&ProfilesManager)) -> Handler {
    let weak = weak.clone();
    Rc::new(move || {
        if let Some(manager) = weak.upgrade() {
            f(&manager);
        }
    })
}

impl Subscribable for ProfilesManager {
    fn connect(&self, signal: &str, handler: Handler) -> Result<SignalId, ConnectError> {
        self.signals.connect(signal, handler)
    }

    fn disconnect(&self, id: SignalId) {
        self.signals.disconnect(id);
    }
}
