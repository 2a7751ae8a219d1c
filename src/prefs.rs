//! Preferences commands: inspect monitors, manage profiles, edit global settings
//!
//! Validation here is the only place profile names are checked for
//! uniqueness; the profile store itself accepts duplicates.

use anyhow::{bail, Context, Result};
use std::rc::Rc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::constants::{defaults, keys, schema, signals::UPDATED, timing, validation};
use crate::monitors::{DisplayConfigService, Monitor, MonitorsConfig};
use crate::profile::{Profile, ProfileSpec, ProfileUpdate, ProfilesManager};
use crate::settings::{or_default, SettingsProvider, SettingsStore};
use crate::signals::Subscribable;

/// User input rejected before it reaches the profile store
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("profile name must not be empty")]
    EmptyName,

    #[error("a profile named `{0}` already exists")]
    DuplicateName(String),

    #[error("scale factor must be greater than 0 and at most {max}, got {value}")]
    ScaleOutOfRange { value: f64, max: f64 },

    #[error("icon size must be between {min} and {max}, got {value}")]
    IconSizeOutOfRange { value: u32, min: u32, max: u32 },
}

/// Trimmed name, unique among every profile except the one at `editing`
pub fn validate_profile_name(
    name: &str,
    profiles: &[Rc<Profile>],
    editing: Option<usize>,
) -> Result<String, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    let taken = profiles
        .iter()
        .enumerate()
        .any(|(index, profile)| Some(index) != editing && profile.name() == name);
    if taken {
        return Err(ValidationError::DuplicateName(name.to_string()));
    }
    Ok(name.to_string())
}

/// Scale factor in `(0, 20]`, rounded to two decimals
pub fn validate_scale_factor(value: f64) -> Result<f64, ValidationError> {
    let rounded = (value * 100.0).round() / 100.0;
    if !rounded.is_finite() || rounded <= 0.0 || rounded > validation::MAX_SCALE_FACTOR {
        return Err(ValidationError::ScaleOutOfRange {
            value,
            max: validation::MAX_SCALE_FACTOR,
        });
    }
    Ok(rounded)
}

pub fn validate_profile_icon_size(value: u32) -> Result<u32, ValidationError> {
    check_icon_size(value, 0, validation::MAX_PROFILE_ICON_SIZE)
}

pub fn validate_default_icon_size(value: u32) -> Result<u32, ValidationError> {
    check_icon_size(
        value,
        validation::MIN_DEFAULT_ICON_SIZE,
        validation::MAX_DEFAULT_ICON_SIZE,
    )
}

fn check_icon_size(value: u32, min: u32, max: u32) -> Result<u32, ValidationError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ValidationError::IconSizeOutOfRange { value, min, max })
    }
}

pub fn format_monitor(monitor: &Monitor) -> String {
    let state = if monitor.active { "Active" } else { "Inactive" };
    let mut line = format!("{}: {} {} ({state})", monitor.index, monitor.vendor, monitor.product);
    if monitor.is_primary {
        line.push_str(", primary");
    }
    line
}

pub fn format_profile(index: usize, profile: &Profile, active: bool) -> String {
    let state = if active { "Active" } else { "Inactive" };
    let mut line = format!(
        "{index}: {} (scale {}",
        profile.name(),
        profile.font_scale_factor()
    );
    if let Some(size) = profile.dash_to_dock_icon_size() {
        line.push_str(&format!(", icon size {size}"));
    }
    line.push_str(&format!(") monitors: {} / {state}", profile.monitors().len()));
    line
}

/// Global settings changes requested on the command line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsChanges {
    pub hide_a11y_icon: Option<bool>,
    pub default_scale_factor: Option<f64>,
    pub integrate_dash_to_dock: Option<bool>,
    pub default_icon_size: Option<u32>,
    pub with_serials: Option<bool>,
}

impl SettingsChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Profile store plus live topology, ready for one command
pub struct Prefs {
    settings: Rc<dyn SettingsStore>,
    profiles: Rc<ProfilesManager>,
}

impl Prefs {
    /// Load profiles and wait (bounded) for the first topology snapshot.
    ///
    /// Must be called from inside a `tokio::task::LocalSet`.
    pub async fn open(
        provider: &dyn SettingsProvider,
        display_config: Rc<dyn DisplayConfigService>,
    ) -> Result<Self> {
        let settings = provider.open(schema::EXTENSION);
        let monitors_config =
            MonitorsConfig::new(display_config).context("Failed to watch monitor topology")?;
        let profiles = ProfilesManager::new(settings.clone(), monitors_config.clone())
            .context("Failed to load profiles")?;

        wait_for_topology(&monitors_config, Duration::from_millis(timing::TOPOLOGY_WAIT_MS)).await;
        Ok(Self { settings, profiles })
    }

    pub fn monitor_lines(&self) -> Vec<String> {
        self.profiles.monitors().iter().map(format_monitor).collect()
    }

    pub fn profile_lines(&self) -> Vec<String> {
        let active = self.profiles.active_profile();
        self.profiles
            .profiles()
            .iter()
            .enumerate()
            .map(|(index, profile)| {
                let is_active = active.as_ref().is_some_and(|a| Rc::ptr_eq(a, profile));
                format_profile(index, profile, is_active)
            })
            .collect()
    }

    /// Save the current topology as a new profile
    pub fn save(&self, name: &str, scale: Option<f64>, icon_size: Option<u32>) -> Result<Rc<Profile>> {
        if let Some(active) = self.profiles.active_profile() {
            bail!("Current monitors already match profile `{}`", active.name());
        }
        let monitors = self.profiles.monitors();
        if monitors.is_empty() {
            bail!("No monitors detected, nothing to save");
        }

        let name = validate_profile_name(name, &self.profiles.profiles(), None)?;
        let scale = validate_scale_factor(scale.unwrap_or_else(|| {
            or_default(
                self.settings.double(keys::DEFAULT_SCALE_FACTOR),
                keys::DEFAULT_SCALE_FACTOR,
                defaults::SCALING_FACTOR,
            )
        }))?;
        let icon_size = match icon_size {
            Some(size) => size,
            None => self
                .settings
                .int(keys::DEFAULT_DASH_TO_DOCK_ICON_SIZE)
                .ok()
                .and_then(|size| u32::try_from(size).ok())
                .unwrap_or(defaults::PROFILE_ICON_SIZE),
        };
        let icon_size = validate_profile_icon_size(icon_size)?;

        let profile = self
            .profiles
            .append_profile(ProfileSpec {
                name,
                font_scale_factor: scale,
                dash_to_dock_icon_size: Some(icon_size),
                monitors,
            })
            .context("Failed to save profile")?;
        Ok(profile)
    }

    pub fn edit(
        &self,
        index: usize,
        name: Option<&str>,
        scale: Option<f64>,
        icon_size: Option<u32>,
    ) -> Result<Rc<Profile>> {
        let profiles = self.profiles.profiles();
        let update = ProfileUpdate {
            name: name
                .map(|name| validate_profile_name(name, &profiles, Some(index)))
                .transpose()?,
            font_scale_factor: scale.map(validate_scale_factor).transpose()?,
            dash_to_dock_icon_size: icon_size
                .map(validate_profile_icon_size)
                .transpose()?
                .map(Some),
        };
        if update == ProfileUpdate::default() {
            bail!("Nothing to change; pass --name, --scale or --icon-size");
        }

        self.profiles
            .update_profile(index, update)
            .with_context(|| format!("Failed to update profile {index}"))
    }

    pub fn remove(&self, index: usize) -> Result<Rc<Profile>> {
        self.profiles
            .remove_profile(index)
            .with_context(|| format!("Failed to remove profile {index}"))
    }

    pub fn settings_lines(&self) -> Vec<String> {
        let s = &self.settings;
        let show = |key: &str, value: String| format!("{key}: {value}");
        vec![
            show(keys::HIDE_A11Y_ICON, display(s.boolean(keys::HIDE_A11Y_ICON))),
            show(keys::DEFAULT_SCALE_FACTOR, display(s.double(keys::DEFAULT_SCALE_FACTOR))),
            show(keys::INTEGRATE_DASH_TO_DOCK, display(s.boolean(keys::INTEGRATE_DASH_TO_DOCK))),
            show(
                keys::DEFAULT_DASH_TO_DOCK_ICON_SIZE,
                display(s.int(keys::DEFAULT_DASH_TO_DOCK_ICON_SIZE)),
            ),
            show(keys::WITH_SERIALS, display(s.boolean(keys::WITH_SERIALS))),
        ]
    }

    pub fn apply_settings(&self, changes: &SettingsChanges) -> Result<()> {
        let s = &self.settings;
        if let Some(hide) = changes.hide_a11y_icon {
            s.set_boolean(keys::HIDE_A11Y_ICON, hide)?;
        }
        if let Some(scale) = changes.default_scale_factor {
            s.set_double(keys::DEFAULT_SCALE_FACTOR, validate_scale_factor(scale)?)?;
        }
        if let Some(integrate) = changes.integrate_dash_to_dock {
            s.set_boolean(keys::INTEGRATE_DASH_TO_DOCK, integrate)?;
        }
        if let Some(size) = changes.default_icon_size {
            let size = validate_default_icon_size(size)?;
            s.set_int(keys::DEFAULT_DASH_TO_DOCK_ICON_SIZE, i32::try_from(size)?)?;
        }
        if let Some(with_serials) = changes.with_serials {
            s.set_boolean(keys::WITH_SERIALS, with_serials)?;
        }
        Ok(())
    }

    /// Release the store and topology subscriptions
    pub fn close(&self) {
        self.profiles.dispose();
    }
}

fn display<T: std::fmt::Display, E: std::fmt::Display>(value: Result<T, E>) -> String {
    match value {
        Ok(value) => value.to_string(),
        Err(e) => format!("<unreadable: {e}>"),
    }
}

/// Resolve once `config` holds a snapshot or `limit` has passed
async fn wait_for_topology(config: &Rc<MonitorsConfig>, limit: Duration) {
    if config.has_snapshot() {
        return;
    }
    let notify = Rc::new(Notify::new());
    let id = {
        let notify = notify.clone();
        config.connect(UPDATED, Rc::new(move || notify.notify_one()))
    };

    match tokio::time::timeout(limit, notify.notified()).await {
        Ok(()) => debug!("topology ready"),
        Err(_) => warn!(waited_ms = limit.as_millis() as u64, "no monitor topology yet, continuing without it"),
    }
    if let Ok(id) = id {
        config.disconnect(id);
    }
}
