//! Cooperative scheduling handle a transport is pinned to at construction.

/// A cloneable handle to the runtime a transport's operations are sequenced on.
///
/// Every transport fixes its executor at construction and every mutating
/// operation runs on it. This is a thin wrapper around [`tokio::runtime::Handle`]
/// rather than a bespoke reactor, since `tokio` already provides the cooperative
/// scheduling and cancel-on-drop semantics the original's executor offered.
#[derive(Clone, Debug)]
pub struct Executor(tokio::runtime::Handle);

impl Executor {
    /// Captures the handle of the runtime currently executing.
    ///
    /// Panics outside of a `tokio` runtime context, matching the original's
    /// assumption that every transport is constructed while its executor is live.
    pub fn current() -> Self {
        Executor(tokio::runtime::Handle::current())
    }

    /// Wraps an explicit handle, for transports constructed off the calling task.
    pub fn from_handle(handle: tokio::runtime::Handle) -> Self {
        Executor(handle)
    }

    /// Spawns a task on this executor, detached from the caller.
    pub fn spawn<F>(&self, future: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: std::future::Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.0.spawn(future)
    }

    /// The underlying `tokio` handle, for code that needs it directly.
    pub fn handle(&self) -> &tokio::runtime::Handle {
        &self.0
    }
}
