//! Monitor topology: snapshot, identity, and the live configuration component
//!
//! - **display_config**: query service seam plus the Mutter D-Bus adapter
//! - **config**: `MonitorsConfig`, rebuilt on every topology change
//! - **identity**: order-independent fingerprint used for profile matching

pub mod config;
pub mod display_config;
pub mod identity;

pub use config::MonitorsConfig;
pub use display_config::{DisplayConfigService, MutterDisplayConfig};
pub use identity::{monitor_identity, MonitorIdentity};

use serde::{Deserialize, Serialize};

/// One physical display as currently detected
///
/// `index` is the position in detection order and is not a stable key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Monitor {
    pub index: usize,
    pub active: bool,
    #[serde(default)]
    pub is_primary: bool,
    pub connector: String,
    pub vendor: String,
    pub product: String,
    #[serde(default)]
    pub serial: String,
    #[serde(default)]
    pub display_name: String,
}

/// `(connector, vendor, product, serial)` as reported by the compositor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MonitorSpec {
    pub connector: String,
    pub vendor: String,
    pub product: String,
    pub serial: String,
}

impl MonitorSpec {
    pub fn new(connector: &str, vendor: &str, product: &str, serial: &str) -> Self {
        Self {
            connector: connector.to_string(),
            vendor: vendor.to_string(),
            product: product.to_string(),
            serial: serial.to_string(),
        }
    }
}

/// Physical monitor entry of a topology query
#[derive(Debug, Clone, PartialEq)]
pub struct RawMonitor {
    pub spec: MonitorSpec,
    pub display_name: String,
}

/// Logical monitor entry of a topology query: one output region, possibly
/// mirrored onto several physical monitors
#[derive(Debug, Clone, PartialEq)]
pub struct RawLogicalMonitor {
    pub primary: bool,
    pub monitors: Vec<MonitorSpec>,
}

/// Result of one topology query
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawDisplayState {
    pub serial: u32,
    pub monitors: Vec<RawMonitor>,
    pub logical_monitors: Vec<RawLogicalMonitor>,
}

/// Monitor list derived from a single query, with the primary resolved
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub monitors: Vec<Monitor>,
    /// Position of the primary monitor in `monitors`
    pub primary: Option<usize>,
}

impl Snapshot {
    pub fn from_state(state: &RawDisplayState) -> Self {
        let mut monitors: Vec<Monitor> = state
            .monitors
            .iter()
            .enumerate()
            .map(|(index, raw)| Monitor {
                index,
                active: false,
                is_primary: false,
                connector: raw.spec.connector.clone(),
                vendor: raw.spec.vendor.clone(),
                product: raw.spec.product.clone(),
                serial: raw.spec.serial.clone(),
                display_name: raw.display_name.clone(),
            })
            .collect();

        let mut primary = None;
        for logical in &state.logical_monitors {
            for spec in &logical.monitors {
                let Some(position) = state.monitors.iter().position(|m| &m.spec == spec) else {
                    continue;
                };
                monitors[position].active = true;

                // Mirrored outputs list several monitors; the first one stands for the group
                if logical.primary && primary.is_none() {
                    monitors[position].is_primary = true;
                    primary = Some(position);
                }
            }
        }

        let active_count = monitors.iter().filter(|m| m.active).count();
        if active_count > 1 && state.logical_monitors.len() == 1 {
            // Clone mode: identify as the primary monitor alone
            for monitor in &mut monitors {
                monitor.active = false;
            }
            if let Some(position) = primary {
                monitors[position].active = true;
            }
        }

        Self { monitors, primary }
    }

    pub fn primary_monitor(&self) -> Option<&Monitor> {
        self.primary.map(|position| &self.monitors[position])
    }
}
