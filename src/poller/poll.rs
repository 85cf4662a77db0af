//! `poll(2)` backend.

use super::registry::PollerHandle;
use super::{millis_ceil, Poller};
use crate::error::Result;

use std::io;
use std::time::Duration;

/// Poller backed by `poll(2)`.
///
/// The pollfd array is rebuilt from the interest table on every step, so the
/// cost scales with the number of registered fds rather than the highest fd
/// number, and there is no FD_SETSIZE ceiling.
pub struct PollPoller {
    handle: PollerHandle,
    fds: Vec<libc::pollfd>,
}

impl Poller for PollPoller {
    fn new() -> Result<Self> {
        Ok(Self {
            handle: PollerHandle::new(),
            fds: Vec::new(),
        })
    }

    fn handle(&self) -> PollerHandle {
        self.handle.clone()
    }

    fn step(&mut self, max_block: Option<Duration>) -> Result<()> {
        self.fds.clear();
        let timeout = {
            let mut reg = self.handle.registry_mut();
            // The pollfd array is rebuilt from the live table; the change
            // log is only for kernel-state backends.
            reg.discard_changes();
            for (fd, read, write) in reg.interests() {
                let mut events: libc::c_short = 0;
                if read {
                    events |= libc::POLLIN;
                }
                if write {
                    events |= libc::POLLOUT;
                }
                self.fds.push(libc::pollfd {
                    fd,
                    events,
                    revents: 0,
                });
            }
            reg.kernel_timeout(max_block)
        };

        let ready = unsafe {
            libc::poll(
                self.fds.as_mut_ptr(),
                self.fds.len() as libc::nfds_t,
                millis_ceil(timeout),
            )
        };
        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err.into());
            }
        }

        let mut reg = self.handle.registry_mut();
        reg.refresh_now();
        reg.wake_expired_timers();

        if ready > 0 {
            for pfd in &self.fds {
                let revents = pfd.revents;
                if revents == 0 {
                    continue;
                }
                // Error and hangup wake both directions so the user's I/O
                // call observes the failure.
                let failed =
                    revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0;
                if failed || revents & libc::POLLIN != 0 {
                    reg.wake_readable(pfd.fd);
                }
                if failed || revents & libc::POLLOUT != 0 {
                    reg.wake_writable(pfd.fd);
                }
            }
        }

        Ok(())
    }
}
