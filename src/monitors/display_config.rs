//! Display configuration query service
//!
//! `DisplayConfigService` is the seam between topology tracking and the
//! compositor. The production implementation talks to
//! `org.gnome.Mutter.DisplayConfig` on the session bus.

use async_trait::async_trait;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::rc::Rc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use zbus::zvariant::{OwnedValue, Value};

use super::{MonitorSpec, RawDisplayState, RawLogicalMonitor, RawMonitor};
use crate::constants::{dbus, signals::MONITORS_CHANGED};
use crate::error::{ConnectError, QueryError};
use crate::signals::{Handler, SignalId, Signals, Subscribable};

/// Source of topology snapshots. Emits `MonitorsChanged` when the topology changes.
#[async_trait(?Send)]
pub trait DisplayConfigService: Subscribable {
    async fn current_state(&self) -> Result<RawDisplayState, QueryError>;
}

type SpecTuple = (String, String, String, String);
type ModeTuple = (String, i32, i32, f64, f64, Vec<f64>, HashMap<String, OwnedValue>);
type MonitorTuple = (SpecTuple, Vec<ModeTuple>, HashMap<String, OwnedValue>);
type LogicalMonitorTuple = (i32, i32, f64, u32, bool, Vec<SpecTuple>, HashMap<String, OwnedValue>);
type CurrentState = (u32, Vec<MonitorTuple>, Vec<LogicalMonitorTuple>, HashMap<String, OwnedValue>);

#[zbus::proxy(interface = "org.gnome.Mutter.DisplayConfig", gen_blocking = false)]
trait DisplayConfig {
    fn get_current_state(&self) -> zbus::Result<CurrentState>;

    #[zbus(signal)]
    fn monitors_changed(&self) -> zbus::Result<()>;
}

const SIGNAL_NAMES: &[&str] = &[MONITORS_CHANGED];

pub struct MutterDisplayConfig {
    proxy: DisplayConfigProxy<'static>,
    signals: Rc<Signals>,
    listener: JoinHandle<()>,
}

impl MutterDisplayConfig {
    /// Create the proxy and start forwarding `MonitorsChanged`.
    ///
    /// Must be called from inside a `tokio::task::LocalSet`.
    pub async fn connect(connection: &zbus::Connection) -> Result<Rc<Self>, QueryError> {
        let proxy = DisplayConfigProxy::builder(connection)
            .destination(dbus::DISPLAY_CONFIG_SERVICE)?
            .path(dbus::DISPLAY_CONFIG_PATH)?
            .build()
            .await?;
        let mut changes = proxy.receive_monitors_changed().await?;

        let signals = Rc::new(Signals::new(SIGNAL_NAMES));
        let listener = {
            let signals = Rc::downgrade(&signals);
            tokio::task::spawn_local(async move {
                while changes.next().await.is_some() {
                    let Some(signals) = signals.upgrade() else {
                        break;
                    };
                    debug!("display configuration changed");
                    signals.emit(MONITORS_CHANGED);
                }
            })
        };

        info!(service = dbus::DISPLAY_CONFIG_SERVICE, "connected to display configuration service");
        Ok(Rc::new(Self {
            proxy,
            signals,
            listener,
        }))
    }
}

impl Drop for MutterDisplayConfig {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

impl Subscribable for MutterDisplayConfig {
    fn connect(&self, signal: &str, handler: Handler) -> Result<SignalId, ConnectError> {
        self.signals.connect(signal, handler)
    }

    fn disconnect(&self, id: SignalId) {
        self.signals.disconnect(id);
    }
}

#[async_trait(?Send)]
impl DisplayConfigService for MutterDisplayConfig {
    async fn current_state(&self) -> Result<RawDisplayState, QueryError> {
        let reply = self.proxy.get_current_state().await?;
        state_from_reply(reply)
    }
}

fn spec_from_tuple((connector, vendor, product, serial): SpecTuple) -> Result<MonitorSpec, QueryError> {
    if connector.is_empty() {
        return Err(QueryError::Malformed(format!(
            "monitor {vendor} {product} has no connector"
        )));
    }
    Ok(MonitorSpec {
        connector,
        vendor,
        product,
        serial,
    })
}

fn display_name(properties: &HashMap<String, OwnedValue>) -> String {
    match properties.get(dbus::DISPLAY_NAME_PROPERTY).map(|value| &**value) {
        Some(Value::Str(name)) => name.as_str().to_string(),
        _ => String::new(),
    }
}

fn state_from_reply(reply: CurrentState) -> Result<RawDisplayState, QueryError> {
    let (serial, monitors, logical_monitors, _properties) = reply;

    let monitors = monitors
        .into_iter()
        .map(|(spec, _modes, properties)| {
            Ok(RawMonitor {
                display_name: display_name(&properties),
                spec: spec_from_tuple(spec)?,
            })
        })
        .collect::<Result<Vec<_>, QueryError>>()?;

    let logical_monitors = logical_monitors
        .into_iter()
        .map(|(_x, _y, _scale, _transform, primary, specs, _properties)| {
            Ok(RawLogicalMonitor {
                primary,
                monitors: specs.into_iter().map(spec_from_tuple).collect::<Result<_, _>>()?,
            })
        })
        .collect::<Result<Vec<_>, QueryError>>()?;

    Ok(RawDisplayState {
        serial,
        monitors,
        logical_monitors,
    })
}
