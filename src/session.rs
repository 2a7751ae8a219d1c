//! Session mode (locked / unlocked) as an `updated` event source

use futures_util::StreamExt;
use std::rc::Rc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::constants::{dbus, signals::UPDATED};
use crate::error::ConnectError;
use crate::signals::{Handler, SignalId, Signals, Subscribable};

#[zbus::proxy(interface = "org.gnome.ScreenSaver", gen_blocking = false)]
trait ScreenSaver {
    fn get_active(&self) -> zbus::Result<bool>;

    #[zbus(signal)]
    fn active_changed(&self, active: bool) -> zbus::Result<()>;
}

const SIGNAL_NAMES: &[&str] = &[UPDATED];

pub struct SessionMode {
    signals: Rc<Signals>,
    listener: Option<JoinHandle<()>>,
}

impl SessionMode {
    /// Follow lock/unlock transitions reported by `org.gnome.ScreenSaver`.
    ///
    /// Must be called from inside a `tokio::task::LocalSet`.
    pub async fn connect(connection: &zbus::Connection) -> zbus::Result<Rc<Self>> {
        let proxy = ScreenSaverProxy::builder(connection)
            .destination(dbus::SCREEN_SAVER_SERVICE)?
            .path(dbus::SCREEN_SAVER_PATH)?
            .build()
            .await?;
        let locked = proxy.get_active().await?;
        let mut changes = proxy.receive_active_changed().await?;

        let signals = Rc::new(Signals::new(SIGNAL_NAMES));
        let listener = {
            let signals = Rc::downgrade(&signals);
            tokio::task::spawn_local(async move {
                while let Some(change) = changes.next().await {
                    let Some(signals) = signals.upgrade() else {
                        break;
                    };
                    match change.args() {
                        Ok(args) => debug!(locked = *args.active(), "session mode changed"),
                        Err(e) => debug!(error = %e, "session mode changed, unreadable arguments"),
                    }
                    signals.emit(UPDATED);
                }
            })
        };

        info!(locked = locked, "following session mode");
        Ok(Rc::new(Self {
            signals,
            listener: Some(listener),
        }))
    }

    /// Source that never fires, for sessions without a screensaver service
    pub fn inert() -> Rc<Self> {
        Rc::new(Self {
            signals: Rc::new(Signals::new(SIGNAL_NAMES)),
            listener: None,
        })
    }
}

impl Drop for SessionMode {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

impl Subscribable for SessionMode {
    fn connect(&self, signal: &str, handler: Handler) -> Result<SignalId, ConnectError> {
        self.signals.connect(signal, handler)
    }

    fn disconnect(&self, id: SignalId) {
        self.signals.disconnect(id);
    }
}
