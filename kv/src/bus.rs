//! The hierarchical key/value bus, treated as an opaque external
//! collaborator per its external interface contract.

/// One change delivered by [`Bus::watch_root`]: `value` is `None` when the
/// path was deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub path: String,
    pub value: Option<String>,
}

/// Error surfaced by a [`Bus`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("bus connection failed: {0}")]
    Connect(String),
    #[error("bus operation on {path:?} failed: {source}")]
    Operation { path: String, source: String },
}

/// A subscribable, path-keyed store. Production deployments back this
/// with XenStore; tests and local runs use [`crate::mock::MockBus`].
pub trait Bus: Send + Sync {
    /// Reads the current value at `path`, if any.
    fn read(&self, path: &str) -> Result<Option<String>, BusError>;

    /// Writes `value` at `path`, creating intermediate nodes as needed.
    fn write(&self, path: &str, value: &str) -> Result<(), BusError>;

    /// True if `path` currently has a value.
    fn exists(&self, path: &str) -> Result<bool, BusError> {
        Ok(self.read(path)?.is_some())
    }

    /// Blocks until the next change under `root` and returns it. Called
    /// repeatedly by the watcher thread; implementations must return
    /// promptly once no further change is pending so the caller can poll
    /// the shutdown flag between deliveries.
    fn next_event(&self, root: &str) -> Result<Event, BusError>;
}
