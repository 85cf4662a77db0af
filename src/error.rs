//! Error taxonomy for awaitable socket operations.
//!
//! Two failure kinds flow out of the library: OS-reported errors carrying the
//! raw `errno`, and deadline-induced timeouts carrying nothing. Both are
//! delivered to the awaiting task at its suspension point; the library never
//! logs them. Orderly peer close is not an error: a read resolves to
//! `Ok(0)` instead.

use std::io;

use thiserror::Error;

/// Failure kinds surfaced by socket operations and address construction.
#[derive(Error, Debug)]
pub enum Error {
    /// An OS-reported failure from a socket syscall. Carries the raw errno.
    #[error("system error: {}", os_error_text(.0))]
    System(i32),

    /// A deadline elapsed before the operation completed.
    #[error("operation timed out")]
    Timeout,

    /// The host string could not be parsed as a dotted-quad IPv4 address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Captures the calling thread's current `errno` as a system error.
    pub(crate) fn last_os_error() -> Self {
        Self::System(errno())
    }

    /// The raw OS error code, if this is a system error.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::System(code) => Some(*code),
            _ => None,
        }
    }

    /// True when a deadline fired before the operation completed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::System(err.raw_os_error().unwrap_or(0))
    }
}

/// The calling thread's current `errno`.
pub(crate) fn errno() -> i32 {
    io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

fn os_error_text(code: &i32) -> io::Error {
    io::Error::from_raw_os_error(*code)
}
