//! The key/value bus abstraction, a mock implementation for tests, and the
//! watcher thread that turns bus changes into an event stream.

pub mod bus;
pub mod mock;
pub mod watcher;

#[cfg(feature = "xenstore")]
pub mod xenstore;

pub use bus::{Bus, BusError, Event};
pub use mock::MockBus;
pub use watcher::spawn_watcher;

#[cfg(feature = "xenstore")]
pub use xenstore::XenStoreBus;
