//! Raw-mode terminal handling for the interactive console.

use std::os::unix::io::BorrowedFd;

use nix::sys::termios::{self, LocalFlags, SetArg, Termios};

#[derive(Debug, thiserror::Error)]
pub enum TermError {
    #[error("reading terminal attributes: {0}")]
    Get(#[source] nix::Error),
    #[error("setting terminal attributes: {0}")]
    Set(#[source] nix::Error),
}

/// Puts stdin into cbreak mode (input available character-by-character,
/// no local echo suppression beyond that) for the lifetime of the
/// guard, restoring the original settings on drop.
pub struct RawModeGuard {
    original: Termios,
}

impl RawModeGuard {
    pub fn enable(fd: BorrowedFd<'_>) -> Result<Self, TermError> {
        let original = termios::tcgetattr(fd).map_err(TermError::Get)?;
        let mut raw = original.clone();
        termios::cfmakeraw(&mut raw);
        raw.local_flags.insert(LocalFlags::ISIG);
        termios::tcsetattr(fd, SetArg::TCSADRAIN, &raw).map_err(TermError::Set)?;
        Ok(RawModeGuard { original })
    }

    pub fn restore(&self, fd: BorrowedFd<'_>) -> Result<(), TermError> {
        termios::tcsetattr(fd, SetArg::TCSADRAIN, &self.original).map_err(TermError::Set)
    }
}
