//! Single-threaded asynchronous networking built on a pluggable readiness
//! poller.
//!
//! User code writes linear `async` handlers over [`Socket`]; the handlers
//! suspend at I/O and timer points and the [`Loop`] resumes them when a file
//! descriptor becomes ready or a deadline passes. Everything runs on one
//! thread: suspension points are explicit, resumptions are serial, and no
//! locks guard library state.
//!
//! # Architecture
//!
//! - **Loop**: one poller step per iteration: block in the kernel, wake
//!   expired timers, wake ready I/O, run every woken task to its next
//!   suspension
//! - **Pollers**: three interchangeable backends with identical semantics:
//!   [`SelectPoller`], [`PollPoller`] and, on Linux, [`EpollPoller`]
//! - **Socket**: move-only owner of a non-blocking TCP fd with awaitable
//!   accept/connect/read/write, each taking an optional deadline
//! - **Task**: detached computation launched with [`Task::spawn`] or
//!   [`Loop::spawn`]
//! - **Sleep**: awaitable delay from
//!   [`PollerHandle::sleep`](poller::PollerHandle::sleep)
//!
//! # Prerequisite
//!
//! Writes to a closed peer must surface as errors, not kill the process:
//! sockets opt out of `SIGPIPE` where the platform allows
//! (`SO_NOSIGPIPE`/`MSG_NOSIGNAL`); elsewhere ignore the signal
//! process-wide, as the demo server does.

mod addr;
mod error;
pub mod net;
pub mod poller;
pub mod runtime;
mod task;
pub mod time;

pub use addr::Address;
pub use error::{Error, Result};
pub use net::socket::Socket;
pub use poller::{PollPoller, Poller, PollerHandle, SelectPoller, TimerId};
pub use runtime::Loop;
pub use task::{JoinHandle, Task};
pub use time::{Sleep, Time};

#[cfg(target_os = "linux")]
pub use poller::EpollPoller;
