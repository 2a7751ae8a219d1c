//! Runtime controller
//!
//! `ScaleByDisplay` owns the topology and profile components while enabled
//! and re-applies the effective font scale factor, dock icon size and
//! accessibility icon visibility whenever the session mode, the extension
//! settings, or the matched profile change. Disabling releases everything and
//! puts the system font scale back to its default.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use tracing::{debug, error, info};

use crate::connections::ManagedConnections;
use crate::constants::{defaults, keys, schema, signals::CHANGED, signals::UPDATED};
use crate::error::EnableError;
use crate::monitors::{DisplayConfigService, MonitorsConfig};
use crate::profile::{Profile, ProfilesManager};
use crate::settings::{or_default, SettingsProvider, SettingsStore};
use crate::signals::{Handler, Subscribable};

/// Extension settings as read at the start of an apply pass
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionState {
    pub hide_a11y_icon: bool,
    pub default_scale_factor: f64,
    pub integrate_dash_to_dock: bool,
    pub default_dash_to_dock_icon_size: Option<u32>,
}

impl Default for ExtensionState {
    fn default() -> Self {
        Self {
            hide_a11y_icon: false,
            default_scale_factor: defaults::SCALING_FACTOR,
            integrate_dash_to_dock: false,
            default_dash_to_dock_icon_size: None,
        }
    }
}

impl ExtensionState {
    pub fn read(settings: &dyn SettingsStore) -> Self {
        Self {
            hide_a11y_icon: or_default(settings.boolean(keys::HIDE_A11Y_ICON), keys::HIDE_A11Y_ICON, false),
            default_scale_factor: or_default(
                settings.double(keys::DEFAULT_SCALE_FACTOR),
                keys::DEFAULT_SCALE_FACTOR,
                defaults::SCALING_FACTOR,
            ),
            integrate_dash_to_dock: or_default(
                settings.boolean(keys::INTEGRATE_DASH_TO_DOCK),
                keys::INTEGRATE_DASH_TO_DOCK,
                false,
            ),
            default_dash_to_dock_icon_size: or_default(
                settings.int(keys::DEFAULT_DASH_TO_DOCK_ICON_SIZE).map(Some),
                keys::DEFAULT_DASH_TO_DOCK_ICON_SIZE,
                None,
            )
            .and_then(|size| u32::try_from(size).ok()),
        }
    }
}

/// Values written to the system by one apply pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectiveScaling {
    pub font_scale_factor: f64,
    /// Only set when dock integration is on
    pub dash_to_dock_icon_size: Option<u32>,
}

pub fn effective_scaling(state: &ExtensionState, active: Option<&Profile>) -> EffectiveScaling {
    let font_scale_factor = active.map_or(state.default_scale_factor, Profile::font_scale_factor);
    let dash_to_dock_icon_size = if state.integrate_dash_to_dock {
        active
            .and_then(Profile::dash_to_dock_icon_size)
            .or(state.default_dash_to_dock_icon_size)
    } else {
        None
    };
    EffectiveScaling {
        font_scale_factor,
        dash_to_dock_icon_size,
    }
}

/// Components that only exist while enabled
struct Running {
    settings: Rc<dyn SettingsStore>,
    profiles: Rc<ProfilesManager>,
    connections: ManagedConnections,
}

enum Lifecycle {
    Disabled,
    Enabled(Running),
}

pub struct ScaleByDisplay {
    provider: Rc<dyn SettingsProvider>,
    display_config: Rc<dyn DisplayConfigService>,
    session_mode: Rc<dyn Subscribable>,
    lifecycle: RefCell<Lifecycle>,
    state: RefCell<ExtensionState>,
    last_applied: Cell<Option<EffectiveScaling>>,
    interface: RefCell<Option<Rc<dyn SettingsStore>>>,
    dash_to_dock: RefCell<Option<Rc<dyn SettingsStore>>>,
    a11y: RefCell<Option<Rc<dyn SettingsStore>>>,
    /// Accessibility icon setting found at enable time, put back on disable
    a11y_initial: Cell<Option<bool>>,
    this: Weak<ScaleByDisplay>,
}

impl ScaleByDisplay {
    pub fn new(
        provider: Rc<dyn SettingsProvider>,
        display_config: Rc<dyn DisplayConfigService>,
        session_mode: Rc<dyn Subscribable>,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            provider,
            display_config,
            session_mode,
            lifecycle: RefCell::new(Lifecycle::Disabled),
            state: RefCell::new(ExtensionState::default()),
            last_applied: Cell::new(None),
            interface: RefCell::new(None),
            dash_to_dock: RefCell::new(None),
            a11y: RefCell::new(None),
            a11y_initial: Cell::new(None),
            this: this.clone(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        matches!(*self.lifecycle.borrow(), Lifecycle::Enabled(_))
    }

    /// Settings read by the most recent apply pass
    #[cfg(test)]
    pub fn state(&self) -> ExtensionState {
        self.state.borrow().clone()
    }

    #[cfg(test)]
    pub fn profiles(&self) -> Option<Rc<ProfilesManager>> {
        match &*self.lifecycle.borrow() {
            Lifecycle::Enabled(running) => Some(running.profiles.clone()),
            Lifecycle::Disabled => None,
        }
    }

    /// Build the topology and profile components, subscribe to every event
    /// source and run one apply pass. Does nothing when already enabled.
    ///
    /// Must be called from inside a `tokio::task::LocalSet`.
    pub fn enable(&self) -> Result<(), EnableError> {
        if self.is_enabled() {
            debug!("already enabled");
            return Ok(());
        }

        let settings = self.provider.open_watched(schema::EXTENSION)?;
        let monitors_config = MonitorsConfig::new(self.display_config.clone())?;
        let profiles = match ProfilesManager::new(settings.clone(), monitors_config.clone()) {
            Ok(profiles) => profiles,
            Err(e) => {
                monitors_config.disconnect_all();
                return Err(e.into());
            }
        };

        let mut connections = ManagedConnections::new();
        let on_update = self.state_update_handler();
        let subscribed = connections
            .connect(self.session_mode.clone(), UPDATED, on_update.clone())
            .and_then(|()| connections.connect(settings.clone(), CHANGED, on_update.clone()))
            .and_then(|()| connections.connect(profiles.clone(), UPDATED, on_update));
        if let Err(e) = subscribed {
            connections.disconnect_all();
            profiles.dispose();
            return Err(e.into());
        }

        self.a11y_initial
            .set(self.a11y_settings().boolean(keys::ALWAYS_SHOW_A11Y_STATUS).ok());
        *self.lifecycle.borrow_mut() = Lifecycle::Enabled(Running {
            settings,
            profiles,
            connections,
        });
        info!("enabled");

        self.on_state_update();
        Ok(())
    }

    /// Release every subscription and component, then reset the system font
    /// scale to its default. Does nothing when already disabled.
    pub fn disable(&self) {
        let Lifecycle::Enabled(mut running) = self.lifecycle.replace(Lifecycle::Disabled) else {
            debug!("already disabled");
            return;
        };
        running.connections.disconnect_all();
        running.profiles.dispose();
        drop(running);

        self.set_scaling_factor(defaults::SCALING_FACTOR, None);
        if let Some(initial) = self.a11y_initial.take() {
            self.set_a11y_icon_visible(initial);
        }
        self.last_applied.set(None);
        self.interface.borrow_mut().take();
        self.dash_to_dock.borrow_mut().take();
        self.a11y.borrow_mut().take();
        info!(scale = defaults::SCALING_FACTOR, "disabled, font scale reset");
    }

    fn state_update_handler(&self) -> Handler {
        let this = self.this.clone();
        Rc::new(move || {
            if let Some(controller) = this.upgrade() {
                controller.on_state_update();
            }
        })
    }

    fn on_state_update(&self) {
        let (settings, profiles) = match &*self.lifecycle.borrow() {
            Lifecycle::Enabled(running) => (running.settings.clone(), running.profiles.clone()),
            Lifecycle::Disabled => return,
        };

        let state = ExtensionState::read(settings.as_ref());
        let active = profiles.active_profile();
        let scaling = effective_scaling(&state, active.as_deref());

        if self.last_applied.get() != Some(scaling) {
            info!(
                profile = active.as_ref().map_or("<default>", |p| p.name()),
                scale = scaling.font_scale_factor,
                icon_size = ?scaling.dash_to_dock_icon_size,
                "applying scaling"
            );
        }
        self.set_scaling_factor(scaling.font_scale_factor, scaling.dash_to_dock_icon_size);
        self.set_a11y_icon_visible(!state.hide_a11y_icon);

        self.last_applied.set(Some(scaling));
        *self.state.borrow_mut() = state;
    }

    fn set_scaling_factor(&self, font_scale_factor: f64, dash_to_dock_icon_size: Option<u32>) {
        let interface = self.lazy_open(&self.interface, schema::INTERFACE);
        if let Err(e) = interface.set_double(keys::TEXT_SCALING_FACTOR, font_scale_factor) {
            error!(scale = font_scale_factor, error = %e, "failed to set text scaling factor");
        }

        if let Some(size) = dash_to_dock_icon_size {
            let dock = self.lazy_open(&self.dash_to_dock, schema::DASH_TO_DOCK);
            let size = i32::try_from(size).unwrap_or(i32::MAX);
            if let Err(e) = dock.set_int(keys::DASH_MAX_ICON_SIZE, size) {
                error!(icon_size = size, error = %e, "failed to set dock icon size");
            }
        }
    }

    fn set_a11y_icon_visible(&self, visible: bool) {
        if let Err(e) = self.a11y_settings().set_boolean(keys::ALWAYS_SHOW_A11Y_STATUS, visible) {
            error!(visible = visible, error = %e, "failed to toggle accessibility icon");
        }
    }

    fn a11y_settings(&self) -> Rc<dyn SettingsStore> {
        self.lazy_open(&self.a11y, schema::A11Y)
    }

    fn lazy_open(&self, slot: &RefCell<Option<Rc<dyn SettingsStore>>>, schema_id: &str) -> Rc<dyn SettingsStore> {
        slot.borrow_mut()
            .get_or_insert_with(|| self.provider.open(schema_id))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitors::RawDisplayState;
    use crate::testing::{
        logical, monitor, raw_monitor, run_local, settle, FakeDisplayConfig, ManualSource, MemoryProvider,
        MemorySettings,
    };
    use serde_json::json;

    fn dell_topology() -> RawDisplayState {
        let m = raw_monitor("DP-1", "Dell", "U2720", "");
        RawDisplayState {
            serial: 1,
            monitors: vec![m.clone()],
            logical_monitors: vec![logical(true, &[&m])],
        }
    }

    struct Fixture {
        provider: Rc<MemoryProvider>,
        service: Rc<FakeDisplayConfig>,
        session: Rc<ManualSource>,
        controller: Rc<ScaleByDisplay>,
    }

    impl Fixture {
        fn new(profiles: serde_json::Value) -> Self {
            let provider = MemoryProvider::new();
            let ext = provider.store(schema::EXTENSION);
            ext.set_boolean(keys::WITH_SERIALS, false).unwrap();
            ext.set_string(keys::PROFILES, &json!({ "profiles": profiles }).to_string()).unwrap();
            let service = FakeDisplayConfig::new(Ok(dell_topology()));
            let session = ManualSource::new();
            let controller = ScaleByDisplay::new(provider.clone(), service.clone(), session.clone());
            Self {
                provider,
                service,
                session,
                controller,
            }
        }

        fn scale(&self) -> f64 {
            self.provider.store(schema::INTERFACE).double(keys::TEXT_SCALING_FACTOR).unwrap()
        }

        fn ext(&self) -> Rc<crate::testing::MemorySettings> {
            self.provider.store(schema::EXTENSION)
        }
    }

    fn desk(scale: f64, icon_size: Option<u32>) -> serde_json::Value {
        json!([{
            "name": "Desk",
            "fontScaleFactor": scale,
            "dashToDockIconSize": icon_size,
            "monitors": [monitor(0, "Dell", "U2720", "", true)],
        }])
    }

    #[test]
    fn test_enable_applies_default_then_matching_profile() {
        run_local(async {
            let f = Fixture::new(desk(1.25, None));
            f.ext().set_double(keys::DEFAULT_SCALE_FACTOR, 1.1).unwrap();

            f.controller.enable().unwrap();
            // Topology not known yet
            assert_eq!(f.scale(), 1.1);

            settle().await;
            assert_eq!(f.scale(), 1.25);
            assert!(f.controller.is_enabled());
        });
    }

    #[test]
    fn test_default_scale_when_no_profile_matches() {
        run_local(async {
            let f = Fixture::new(json!([]));
            f.ext().set_double(keys::DEFAULT_SCALE_FACTOR, 1.4).unwrap();

            f.controller.enable().unwrap();
            settle().await;
            assert_eq!(f.scale(), 1.4);
            assert_eq!(f.controller.state().default_scale_factor, 1.4);
        });
    }

    #[test]
    fn test_dock_icon_size_only_with_integration() {
        run_local(async {
            let f = Fixture::new(desk(1.25, Some(40)));
            f.controller.enable().unwrap();
            settle().await;
            assert!(!f.provider.opened().iter().any(|s| s == schema::DASH_TO_DOCK));

            f.ext().set_boolean(keys::INTEGRATE_DASH_TO_DOCK, true).unwrap();
            settle().await;
            let dock = f.provider.store(schema::DASH_TO_DOCK);
            assert_eq!(dock.int(keys::DASH_MAX_ICON_SIZE).unwrap(), 40);
        });
    }

    #[test]
    fn test_dock_falls_back_to_default_icon_size() {
        run_local(async {
            let f = Fixture::new(desk(1.25, None));
            f.ext().set_boolean(keys::INTEGRATE_DASH_TO_DOCK, true).unwrap();
            f.ext().set_int(keys::DEFAULT_DASH_TO_DOCK_ICON_SIZE, 48).unwrap();

            f.controller.enable().unwrap();
            settle().await;
            let dock = f.provider.store(schema::DASH_TO_DOCK);
            assert_eq!(dock.int(keys::DASH_MAX_ICON_SIZE).unwrap(), 48);
        });
    }

    #[test]
    fn test_session_mode_change_reapplies() {
        run_local(async {
            let f = Fixture::new(desk(1.25, None));
            f.controller.enable().unwrap();
            settle().await;

            let interface = f.provider.store(schema::INTERFACE);
            interface.set_double(keys::TEXT_SCALING_FACTOR, 2.0).unwrap();
            f.session.fire();
            assert_eq!(f.scale(), 1.25);
        });
    }

    #[test]
    fn test_disable_twice_resets_scale_once() {
        run_local(async {
            let f = Fixture::new(desk(1.25, None));
            f.controller.enable().unwrap();
            settle().await;
            assert_eq!(f.scale(), 1.25);

            f.controller.disable();
            assert_eq!(f.scale(), defaults::SCALING_FACTOR);
            let writes = f.provider.store(schema::INTERFACE).writes().len();

            f.controller.disable();
            assert!(!f.controller.is_enabled());
            assert_eq!(f.scale(), defaults::SCALING_FACTOR);
            assert_eq!(f.provider.store(schema::INTERFACE).writes().len(), writes);
        });
    }

    #[test]
    fn test_disable_releases_every_subscription() {
        run_local(async {
            let f = Fixture::new(desk(1.25, None));
            f.controller.enable().unwrap();
            f.controller.enable().unwrap();
            assert_eq!(f.session.handler_count(), 1);
            settle().await;

            f.controller.disable();
            assert_eq!(f.session.handler_count(), 0);
            assert_eq!(f.ext().handler_count(), 0);
            assert_eq!(f.service.handler_count(), 0);
            assert!(f.controller.profiles().is_none());

            let writes = f.provider.store(schema::INTERFACE).writes().len();
            f.session.fire();
            f.service.emit_monitors_changed();
            f.ext().set_double(keys::DEFAULT_SCALE_FACTOR, 3.0).unwrap();
            settle().await;
            assert_eq!(f.provider.store(schema::INTERFACE).writes().len(), writes);
        });
    }

    #[test]
    fn test_disable_before_first_query_cancels_it() {
        run_local(async {
            let f = Fixture::new(desk(1.25, None));
            f.controller.enable().unwrap();
            f.controller.disable();
            settle().await;

            assert_eq!(f.service.queries(), 0);
            assert_eq!(f.scale(), defaults::SCALING_FACTOR);
        });
    }

    #[test]
    fn test_a11y_icon_follows_setting_and_is_restored() {
        run_local(async {
            let f = Fixture::new(json!([]));
            let a11y = f.provider.store(schema::A11Y);
            a11y.set_boolean(keys::ALWAYS_SHOW_A11Y_STATUS, true).unwrap();
            f.ext().set_boolean(keys::HIDE_A11Y_ICON, true).unwrap();

            f.controller.enable().unwrap();
            assert!(!a11y.boolean(keys::ALWAYS_SHOW_A11Y_STATUS).unwrap());

            f.controller.disable();
            assert!(a11y.boolean(keys::ALWAYS_SHOW_A11Y_STATUS).unwrap());
        });
    }

    #[test]
    fn test_effective_scaling_rules() {
        let state = ExtensionState {
            default_scale_factor: 1.1,
            default_dash_to_dock_icon_size: Some(48),
            ..ExtensionState::default()
        };
        assert_eq!(
            effective_scaling(&state, None),
            EffectiveScaling {
                font_scale_factor: 1.1,
                dash_to_dock_icon_size: None
            }
        );

        let integrated = ExtensionState {
            integrate_dash_to_dock: true,
            ..state
        };
        assert_eq!(effective_scaling(&integrated, None).dash_to_dock_icon_size, Some(48));
    }

    #[test]
    fn test_unreadable_state_keys_fall_back() {
        run_local(async {
            let settings = MemorySettings::new(schema::EXTENSION);
            assert_eq!(ExtensionState::read(settings.as_ref()), ExtensionState::default());

            settings.set_string(keys::DEFAULT_DASH_TO_DOCK_ICON_SIZE, "large").unwrap();
            settings.set_double(keys::DEFAULT_SCALE_FACTOR, 1.5).unwrap();
            let state = ExtensionState::read(settings.as_ref());
            assert_eq!(state.default_dash_to_dock_icon_size, None);
            assert_eq!(state.default_scale_factor, 1.5);

            settings.set_int(keys::DEFAULT_DASH_TO_DOCK_ICON_SIZE, -1).unwrap();
            assert_eq!(ExtensionState::read(settings.as_ref()).default_dash_to_dock_icon_size, None);

            settings.set_int(keys::DEFAULT_DASH_TO_DOCK_ICON_SIZE, 40).unwrap();
            assert_eq!(ExtensionState::read(settings.as_ref()).default_dash_to_dock_icon_size, Some(40));
        });
    }
}
