//! Live monitor topology
//!
//! Holds the snapshot derived from the latest topology query and emits
//! `updated` every time it is rebuilt. Queries are issued once after
//! construction (deferred to the next loop turn) and on every
//! `MonitorsChanged` from the display configuration service.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use tracing::{debug, error, info};

use super::display_config::DisplayConfigService;
use super::{Monitor, RawDisplayState, Snapshot};
use crate::constants::signals::{MONITORS_CHANGED, UPDATED};
use crate::error::{ConnectError, QueryError};
use crate::idle::{idle_add_once, IdleSource};
use crate::signals::{Handler, SignalId, Signals, Subscribable};

const SIGNAL_NAMES: &[&str] = &[UPDATED];

pub struct MonitorsConfig {
    service: Rc<dyn DisplayConfigService>,
    snapshot: RefCell<Snapshot>,
    signals: Signals,
    service_signal: Cell<Option<SignalId>>,
    init_source: RefCell<Option<IdleSource>>,
    had_init_run: Cell<bool>,
    /// Bumped per query; only the reply to the newest query is applied
    generation: Cell<u64>,
    applied: Cell<bool>,
    disposed: Cell<bool>,
    this: Weak<MonitorsConfig>,
}

impl MonitorsConfig {
    /// Subscribe to topology changes and schedule the first query.
    ///
    /// Must be called from inside a `tokio::task::LocalSet`.
    pub fn new(service: Rc<dyn DisplayConfigService>) -> Result<Rc<Self>, ConnectError> {
        let config = Rc::new_cyclic(|this: &Weak<MonitorsConfig>| Self {
            service: service.clone(),
            snapshot: RefCell::new(Snapshot::default()),
            signals: Signals::new(SIGNAL_NAMES),
            service_signal: Cell::new(None),
            init_source: RefCell::new(None),
            had_init_run: Cell::new(false),
            generation: Cell::new(0),
            applied: Cell::new(false),
            disposed: Cell::new(false),
            this: this.clone(),
        });

        let on_changed: Handler = {
            let this = config.this.clone();
            Rc::new(move || {
                if let Some(config) = this.upgrade() {
                    config.update_resources();
                }
            })
        };
        config
            .service_signal
            .set(Some(service.connect(MONITORS_CHANGED, on_changed)?));

        let init = {
            let this = config.this.clone();
            idle_add_once(move || {
                let Some(config) = this.upgrade() else {
                    return;
                };
                config.init_source.borrow_mut().take();
                // A change notification may already have triggered a query
                if !config.had_init_run.get() {
                    config.update_resources();
                }
            })
        };
        *config.init_source.borrow_mut() = Some(init);

        Ok(config)
    }

    /// Monitors from the most recent snapshot
    pub fn monitors(&self) -> Vec<Monitor> {
        self.snapshot.borrow().monitors.clone()
    }

    #[cfg(test)]
    pub fn primary_monitor(&self) -> Option<Monitor> {
        self.snapshot.borrow().primary_monitor().cloned()
    }

    /// Whether at least one query result (or failure) has been applied
    pub fn has_snapshot(&self) -> bool {
        self.applied.get()
    }

    /// Release the service subscription, cancel the pending first query and
    /// drop every `updated` handler. Late query replies are discarded.
    pub fn disconnect_all(&self) {
        if self.disposed.replace(true) {
            return;
        }
        if let Some(id) = self.service_signal.take() {
            self.service.disconnect(id);
        }
        if let Some(mut source) = self.init_source.borrow_mut().take() {
            source.remove();
        }
        self.signals.dispose();
        debug!("monitors config disposed");
    }

    fn update_resources(&self) {
        if self.disposed.get() {
            return;
        }
        self.had_init_run.set(true);
        let generation = self.generation.get() + 1;
        self.generation.set(generation);

        let this = self.this.clone();
        let service = self.service.clone();
        tokio::task::spawn_local(async move {
            let result = service.current_state().await;
            let Some(config) = this.upgrade() else {
                return;
            };
            if config.disposed.get() {
                return;
            }
            if config.generation.get() != generation {
                debug!(generation = generation, "discarding superseded topology reply");
                return;
            }
            config.apply(result);
        });
    }

    fn apply(&self, result: Result<RawDisplayState, QueryError>) {
        let snapshot = match result {
            Ok(state) => {
                let snapshot = Snapshot::from_state(&state);
                info!(
                    serial = state.serial,
                    monitors = snapshot.monitors.len(),
                    active = snapshot.monitors.iter().filter(|m| m.active).count(),
                    primary = snapshot.primary_monitor().map_or("<none>", |m| m.connector.as_str()),
                    "monitor topology updated"
                );
                snapshot
            }
            Err(e) => {
                error!(error = %e, "failed to query monitor topology");
                Snapshot::default()
            }
        };
        *self.snapshot.borrow_mut() = snapshot;
        self.applied.set(true);
        self.signals.emit(UPDATED);
    }
}

impl Subscribable for MonitorsConfig {
    fn connect(&self, signal: &str, handler: Handler) -> Result<SignalId, ConnectError> {
        self.signals.connect(signal, handler)
    }

    fn disconnect(&self, id: SignalId) {
        self.signals.disconnect(id);
    }
}
