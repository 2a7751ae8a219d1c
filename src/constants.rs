//! Application-wide constants
//!
//! This module contains all magic numbers and string literals used throughout
//! the application, providing a single source of truth for constant values.

/// GSettings schema identifiers
pub mod schema {
    /// Settings owned by this daemon (profiles, defaults, toggles)
    pub const EXTENSION: &str = "org.gnome.shell.extensions.scale-by-display";

    /// Desktop interface settings (system-wide text scaling, shared with the lock screen)
    pub const INTERFACE: &str = "org.gnome.desktop.interface";

    /// Dash to Dock extension settings (optional third-party integration)
    pub const DASH_TO_DOCK: &str = "org.gnome.shell.extensions.dash-to-dock";

    /// Accessibility settings (controls the universal access status icon)
    pub const A11Y: &str = "org.gnome.desktop.a11y";
}

/// Setting keys, grouped by the schema they belong to
pub mod keys {
    pub const HIDE_A11Y_ICON: &str = "hide-a11y-icon";
    pub const DEFAULT_SCALE_FACTOR: &str = "default-scale-factor";
    pub const INTEGRATE_DASH_TO_DOCK: &str = "integrate-dash-to-dock";
    pub const DEFAULT_DASH_TO_DOCK_ICON_SIZE: &str = "default-dash-to-dock-icon-size";
    pub const WITH_SERIALS: &str = "with-serials";
    pub const PROFILES: &str = "profiles";

    /// `org.gnome.desktop.interface`
    pub const TEXT_SCALING_FACTOR: &str = "text-scaling-factor";

    /// `org.gnome.shell.extensions.dash-to-dock`
    pub const DASH_MAX_ICON_SIZE: &str = "dash-max-icon-size";

    /// `org.gnome.desktop.a11y`
    pub const ALWAYS_SHOW_A11Y_STATUS: &str = "always-show-universal-access-status";
}

/// Fallback values when a setting is unset or unreadable
pub mod defaults {
    /// System default font scale factor
    pub const SCALING_FACTOR: f64 = 1.0;

    /// Serials are part of the monitor identity unless disabled
    pub const WITH_SERIALS: bool = true;

    /// Icon size offered when saving a profile and no default is configured
    pub const PROFILE_ICON_SIZE: u32 = 32;
}

/// Limits enforced by the preferences surface
pub mod validation {
    pub const MAX_SCALE_FACTOR: f64 = 20.0;
    pub const MAX_PROFILE_ICON_SIZE: u32 = 320;
    pub const MIN_DEFAULT_ICON_SIZE: u32 = 4;
    pub const MAX_DEFAULT_ICON_SIZE: u32 = 256;
}

/// Signal names emitted by the event sources in this crate
pub mod signals {
    /// Topology snapshot rebuilt, profile list reloaded, or session mode changed
    pub const UPDATED: &str = "updated";

    /// A key in a settings store changed
    pub const CHANGED: &str = "changed";

    /// Display configuration service reports a topology change
    pub const MONITORS_CHANGED: &str = "MonitorsChanged";
}

/// D-Bus names used to reach the compositor and session services
pub mod dbus {
    pub const DISPLAY_CONFIG_SERVICE: &str = "org.gnome.Mutter.DisplayConfig";
    pub const DISPLAY_CONFIG_PATH: &str = "/org/gnome/Mutter/DisplayConfig";
    pub const SCREEN_SAVER_SERVICE: &str = "org.gnome.ScreenSaver";
    pub const SCREEN_SAVER_PATH: &str = "/org/gnome/ScreenSaver";

    /// Physical-monitor property holding the human readable monitor name
    pub const DISPLAY_NAME_PROPERTY: &str = "display-name";
}

/// Filesystem locations and external tools
pub mod paths {
    /// Extension UUID, used to locate an installed copy of the settings schema
    pub const EXTENSION_UUID: &str = "scale-by-display@scale-by-display";

    /// GSettings command line tool
    pub const GSETTINGS_BIN: &str = "gsettings";

    /// Compiled schema file that marks a directory as a usable schema dir
    pub const COMPILED_SCHEMAS: &str = "gschemas.compiled";
}

/// Preferences CLI timing
pub mod timing {
    /// How long the CLI waits for the first topology snapshot (milliseconds)
    pub const TOPOLOGY_WAIT_MS: u64 = 3000;
}
