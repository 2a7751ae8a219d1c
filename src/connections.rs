//! Bookkeeping for signal subscriptions held by one owner
//!
//! Components connect to several sources over their lifetime and must be
//! able to drop every subscription at teardown in one call. Ids are grouped
//! per source and released through that source's own `disconnect`.

use std::rc::Rc;
use tracing::debug;

use crate::error::ConnectError;
use crate::signals::{Handler, SignalId, Subscribable};

struct SourceConnections {
    source: Rc<dyn Subscribable>,
    ids: Vec<SignalId>,
}

#[derive(Default)]
pub struct ManagedConnections {
    connections: Vec<SourceConnections>,
}

impl ManagedConnections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `handler` to `signal` on `source` and remember the subscription
    pub fn connect(
        &mut self,
        source: Rc<dyn Subscribable>,
        signal: &str,
        handler: Handler,
    ) -> Result<(), ConnectError> {
        let id = source.connect(signal, handler)?;

        match self
            .connections
            .iter_mut()
            .find(|entry| std::ptr::addr_eq(Rc::as_ptr(&entry.source), Rc::as_ptr(&source)))
        {
            Some(entry) => entry.ids.push(id),
            None => self.connections.push(SourceConnections { source, ids: vec![id] }),
        }
        Ok(())
    }

    /// Release every recorded subscription. Safe to call repeatedly.
    pub fn disconnect_all(&mut self) {
        if self.connections.is_empty() {
            return;
        }
        let released: usize = self.connections.iter().map(|entry| entry.ids.len()).sum();
        for entry in self.connections.drain(..) {
            for id in entry.ids {
                entry.source.disconnect(id);
            }
        }
        debug!(released = released, "released signal connections");
    }

    /// Number of live subscriptions across all sources
    pub fn len(&self) -> usize {
        self.connections.iter().map(|entry| entry.ids.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl Drop for ManagedConnections {
    fn drop(&mut self) {
        self.disconnect_all();
    }
}
