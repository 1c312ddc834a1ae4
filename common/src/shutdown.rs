//! Process-wide shutdown flag and the signal handlers that set it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::signal::{self, SigHandler, Signal};

/// A cheaply-cloneable flag every blocking loop polls between iterations.
///
/// Signal handlers only ever call [`ShutdownFlag::trigger`], which is a
/// single relaxed store — safe to call from within a signal handler since
/// it performs no allocation, locking, or I/O.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        ShutdownFlag(Arc::new(AtomicBool::new(false)))
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

static FLAG: std::sync::OnceLock<ShutdownFlag> = std::sync::OnceLock::new();

extern "C" fn handle_signal(_signum: libc::c_int) {
    if let Some(flag) = FLAG.get() {
        flag.trigger();
    }
}

/// Error returned when installing a signal handler fails.
#[derive(Debug, thiserror::Error)]
#[error("failed to install handler for {signal}: {source}")]
pub struct InstallSignalError {
    signal: Signal,
    #[source]
    source: nix::Error,
}

/// Installs handlers for SIGINT, SIGTERM, SIGABRT and SIGQUIT that do
/// nothing but set `flag`. Must be called exactly once per process; the
/// returned flag is the one every handler will trigger.
pub fn install_signal_handlers(flag: ShutdownFlag) -> Result<ShutdownFlag, InstallSignalError> {
    let _ = FLAG.set(flag.clone());
    let handler = SigHandler::Handler(handle_signal);
    for signal in [Signal::SIGINT, Signal::SIGTERM, Signal::SIGABRT, Signal::SIGQUIT] {
        // SAFETY: `handle_signal` only performs a relaxed atomic store, which
        // is async-signal-safe.
        unsafe { signal::signal(signal, handler) }.map_err(|source| InstallSignalError { signal, source })?;
    }
    Ok(flag)
}
