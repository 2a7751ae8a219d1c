//! Order-independent topology fingerprint

use std::collections::BTreeSet;

use super::Monitor;

/// Set of per-monitor keys, compared for equality only
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MonitorIdentity(BTreeSet<String>);

impl MonitorIdentity {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// `vendor-product[-serial]-active|inactive` for one monitor
fn monitor_key(monitor: &Monitor, with_serials: bool) -> String {
    let state = if monitor.active { "active" } else { "inactive" };
    if with_serials {
        format!("{}-{}-{}-{}", monitor.vendor, monitor.product, monitor.serial, state)
    } else {
        format!("{}-{}-{}", monitor.vendor, monitor.product, state)
    }
}

/// Identity of a monitor list. Detection order does not matter; monitors
/// that produce the same key collapse into one entry.
pub fn monitor_identity(monitors: &[Monitor], with_serials: bool) -> MonitorIdentity {
    MonitorIdentity(
        monitors
            .iter()
            .map(|monitor| monitor_key(monitor, with_serials))
            .collect(),
    )
}
