//! One-shot deferred callbacks on the local event loop

use tokio::task::JoinHandle;

/// Handle to a callback scheduled with [`idle_add_once`]
///
/// The callback runs on a later loop turn than the one that scheduled it.
/// Dropping the handle does not cancel it; call [`IdleSource::remove`].
pub struct IdleSource {
    handle: Option<JoinHandle<()>>,
}

/// Schedule `f` to run once the current loop turn has finished.
///
/// Must be called from inside a `tokio::task::LocalSet`.
pub fn idle_add_once<F>(f: F) -> IdleSource
where
    F: FnOnce() + 'static,
{
    let handle = tokio::task::spawn_local(async move { f() });
    IdleSource { handle: Some(handle) }
}

impl IdleSource {
    /// Cancel the callback if it has not run yet
    pub fn remove(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}
