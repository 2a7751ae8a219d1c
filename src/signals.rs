//! Named signals and the subscription trait shared by every event source
//!
//! Sources declare the signals they emit up front. Connecting to anything
//! else fails, so a typo in a signal name surfaces at registration time
//! instead of as a handler that silently never fires.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::trace;

use crate::error::ConnectError;

/// Callback invoked when a signal is emitted
pub type Handler = Rc<dyn Fn()>;

/// Opaque handle returned by `connect`, used to disconnect later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignalId(u64);

/// Anything that can hand out signal subscriptions
pub trait Subscribable {
    fn connect(&self, signal: &str, handler: Handler) -> Result<SignalId, ConnectError>;

    /// Detach a handler. Unknown or already-detached ids are ignored.
    fn disconnect(&self, id: SignalId);
}

struct Connection {
    id: SignalId,
    signal: &'static str,
    handler: Handler,
}

/// Handler table for a fixed set of signal names
pub struct Signals {
    names: &'static [&'static str],
    next_id: Cell<u64>,
    connections: RefCell<Vec<Connection>>,
    disposed: Cell<bool>,
}

impl Signals {
    pub fn new(names: &'static [&'static str]) -> Self {
        Self {
            names,
            next_id: Cell::new(1),
            connections: RefCell::new(Vec::new()),
            disposed: Cell::new(false),
        }
    }

    pub fn connect(&self, signal: &str, handler: Handler) -> Result<SignalId, ConnectError> {
        let name = self
            .names
            .iter()
            .copied()
            .find(|name| *name == signal)
            .filter(|_| !self.disposed.get())
            .ok_or_else(|| ConnectError::InvalidSource {
                signal: signal.to_string(),
            })?;

        let id = SignalId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.connections.borrow_mut().push(Connection {
            id,
            signal: name,
            handler,
        });
        Ok(id)
    }

    pub fn disconnect(&self, id: SignalId) -> bool {
        let mut connections = self.connections.borrow_mut();
        let before = connections.len();
        connections.retain(|c| c.id != id);
        connections.len() != before
    }

    /// Run every handler connected to `signal`, in registration order.
    ///
    /// Handlers may connect or disconnect while the emission is running;
    /// a handler disconnected mid-emission is not called.
    pub fn emit(&self, signal: &str) {
        let pending: Vec<(SignalId, Handler)> = self
            .connections
            .borrow()
            .iter()
            .filter(|c| c.signal == signal)
            .map(|c| (c.id, c.handler.clone()))
            .collect();

        trace!(signal = signal, handlers = pending.len(), "emitting signal");

        for (id, handler) in pending {
            let still_connected = self.connections.borrow().iter().any(|c| c.id == id);
            if still_connected {
                handler();
            }
        }
    }

    /// Drop every handler and refuse new ones
    pub fn dispose(&self) {
        self.disposed.set(true);
        self.connections.borrow_mut().clear();
    }

    #[cfg(test)]
    pub fn handler_count(&self) -> usize {
        self.connections.borrow().len()
    }
}

impl Subscribable for Signals {
    fn connect(&self, signal: &str, handler: Handler) -> Result<SignalId, ConnectError> {
        Signals::connect(self, signal, handler)
    }

    fn disconnect(&self, id: SignalId) {
        Signals::disconnect(self, id);
    }
}
