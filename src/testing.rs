//! Shared test fixtures: local runtime, monitor builders, and fake services

use async_trait::async_trait;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;
use tokio::sync::oneshot;

use crate::constants::signals::MONITORS_CHANGED;
use crate::error::{ConnectError, QueryError};
use crate::monitors::{DisplayConfigService, Monitor, MonitorSpec, RawDisplayState, RawLogicalMonitor, RawMonitor};
use crate::signals::{Handler, SignalId, Signals, Subscribable};

pub use crate::settings::memory::{MemoryProvider, MemorySettings};

/// Run `future` on a fresh current-thread runtime inside a `LocalSet`
pub fn run_local<F: Future>(future: F) -> F::Output {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build test runtime");
    tokio::task::LocalSet::new().block_on(&runtime, future)
}

/// Let spawned local tasks (and the tasks they spawn) run to completion
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

pub fn monitor(index: usize, vendor: &str, product: &str, serial: &str, active: bool) -> Monitor {
    Monitor {
        index,
        active,
        is_primary: false,
        connector: format!("DP-{index}"),
        vendor: vendor.to_string(),
        product: product.to_string(),
        serial: serial.to_string(),
        display_name: String::new(),
    }
}

pub fn raw_monitor(connector: &str, vendor: &str, product: &str, serial: &str) -> RawMonitor {
    RawMonitor {
        spec: MonitorSpec::new(connector, vendor, product, serial),
        display_name: format!("{vendor} {product}"),
    }
}

pub fn logical(primary: bool, monitors: &[&RawMonitor]) -> RawLogicalMonitor {
    RawLogicalMonitor {
        primary,
        monitors: monitors.iter().map(|m| m.spec.clone()).collect(),
    }
}

type FakeReply = Result<RawDisplayState, String>;

/// Display configuration service answering every query with a canned reply,
/// or holding replies back until the test answers them one by one
pub struct FakeDisplayConfig {
    reply: RefCell<FakeReply>,
    signals: Signals,
    queries: Cell<usize>,
    hold: Cell<bool>,
    held: RefCell<Vec<Option<oneshot::Sender<FakeReply>>>>,
}

const FAKE_SIGNALS: &[&str] = &[MONITORS_CHANGED];

impl FakeDisplayConfig {
    pub fn new(reply: FakeReply) -> Rc<Self> {
        Rc::new(Self {
            reply: RefCell::new(reply),
            signals: Signals::new(FAKE_SIGNALS),
            queries: Cell::new(0),
            hold: Cell::new(false),
            held: RefCell::new(Vec::new()),
        })
    }

    /// Park every later query until `answer` is called for it
    pub fn hold_replies(&self) {
        self.hold.set(true);
    }

    /// Reply to the `nth` held query (0-based, in request order)
    pub fn answer(&self, nth: usize, reply: FakeReply) {
        let sender = self.held.borrow_mut().get_mut(nth).and_then(Option::take);
        match sender {
            Some(sender) => {
                let _ = sender.send(reply);
            }
            None => panic!("no pending query #{nth}"),
        }
    }

    pub fn set_reply(&self, reply: FakeReply) {
        *self.reply.borrow_mut() = reply;
    }

    pub fn emit_monitors_changed(&self) {
        self.signals.emit(MONITORS_CHANGED);
    }

    /// Number of `current_state` calls so far
    pub fn queries(&self) -> usize {
        self.queries.get()
    }

    pub fn handler_count(&self) -> usize {
        self.signals.handler_count()
    }
}

impl Subscribable for FakeDisplayConfig {
    fn connect(&self, signal: &str, handler: Handler) -> Result<SignalId, ConnectError> {
        self.signals.connect(signal, handler)
    }

    fn disconnect(&self, id: SignalId) {
        self.signals.disconnect(id);
    }
}

#[async_trait(?Send)]
impl DisplayConfigService for FakeDisplayConfig {
    async fn current_state(&self) -> Result<RawDisplayState, QueryError> {
        self.queries.set(self.queries.get() + 1);
        if self.hold.get() {
            let (tx, rx) = oneshot::channel();
            self.held.borrow_mut().push(Some(tx));
            return match rx.await {
                Ok(reply) => reply.map_err(QueryError::Malformed),
                Err(_) => Err(QueryError::Malformed("reply never sent".to_string())),
            };
        }
        let reply = self.reply.borrow().clone();
        // Reply on a later turn, like a D-Bus round trip
        tokio::task::yield_now().await;
        reply.map_err(QueryError::Malformed)
    }
}

/// Event source with an `updated` signal that tests fire by hand
pub struct ManualSource {
    signals: Signals,
}

const MANUAL_SIGNALS: &[&str] = &[crate::constants::signals::UPDATED];

impl ManualSource {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            signals: Signals::new(MANUAL_SIGNALS),
        })
    }

    pub fn fire(&self) {
        self.signals.emit(crate::constants::signals::UPDATED);
    }

    pub fn handler_count(&self) -> usize {
        self.signals.handler_count()
    }
}

impl Subscribable for ManualSource {
    fn connect(&self, signal: &str, handler: Handler) -> Result<SignalId, ConnectError> {
        self.signals.connect(signal, handler)
    }

    fn disconnect(&self, id: SignalId) {
        self.signals.disconnect(id);
    }
}
