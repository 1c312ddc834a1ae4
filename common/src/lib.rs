//! Shared types used across the supervisor: hardware addresses, instance
//! identity, and the process-wide shutdown flag.

pub mod domain;
pub mod limits;
pub mod mac;
pub mod shutdown;

pub use domain::DomainId;
pub use mac::{Mac, MacPool, MacPoolExhausted, ParseMacError};
pub use shutdown::{InstallSignalError, ShutdownFlag, install_signal_handlers};
