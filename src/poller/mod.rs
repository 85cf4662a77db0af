//! Readiness pollers.
//!
//! Three interchangeable backends drive the event loop:
//!
//! - [`SelectPoller`]: `select(2)`, fd_set bitmaps rebuilt each step
//! - [`PollPoller`]: `poll(2)`, a pollfd array rebuilt each step
//! - [`EpollPoller`]: `epoll(7)` (Linux), a kernel-side interest set
//!
//! All three expose identical semantics through the [`Poller`] trait and
//! share one registry holding the interest table and the timer queue.
//! Dispatch is per-step, so the loop stays generic over the backend at zero
//! cost.

mod registry;

mod poll;
mod select;

#[cfg(target_os = "linux")]
mod epoll;

pub use poll::PollPoller;
pub use registry::{PollerHandle, TimerId};
pub use select::SelectPoller;

#[cfg(target_os = "linux")]
pub use epoll::EpollPoller;

use crate::error::Result;

use std::time::Duration;

/// A readiness poller: batches kernel readiness notifications and timer
/// expirations into task wakes.
pub trait Poller: Sized {
    fn new() -> Result<Self>;

    /// The shared handle sockets use for registration.
    fn handle(&self) -> PollerHandle;

    /// Performs one poller step.
    ///
    /// Blocks in the kernel for at most `max_block` (`None` leaves the limit
    /// to the nearest timer deadline, or blocks indefinitely when only I/O
    /// interests exist), then wakes all expired timer waiters followed by all
    /// ready I/O waiters, each exactly once. `EINTR` counts as zero events.
    fn step(&mut self, max_block: Option<Duration>) -> Result<()>;
}

/// Milliseconds for poll/epoll timeouts, rounded up so timers never fire
/// early. `None` maps to -1 (block indefinitely).
pub(crate) fn millis_ceil(timeout: Option<Duration>) -> i32 {
    match timeout {
        None => -1,
        Some(d) => {
            let ms = d
                .as_secs()
                .saturating_mul(1_000)
                .saturating_add(d.subsec_nanos().div_ceil(1_000_000) as u64);
            ms.min(i32::MAX as u64) as i32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_round_up() {
        assert_eq!(millis_ceil(None), -1);
        assert_eq!(millis_ceil(Some(Duration::ZERO)), 0);
        assert_eq!(millis_ceil(Some(Duration::from_micros(1))), 1);
        assert_eq!(millis_ceil(Some(Duration::from_millis(100))), 100);
        assert_eq!(millis_ceil(Some(Duration::from_nanos(1_000_001))), 2);
    }
}
