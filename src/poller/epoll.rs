//! `epoll(7)` backend (Linux).

use super::registry::PollerHandle;
use super::{millis_ceil, Poller};
use crate::error::{Error, Result};

use std::collections::HashMap;
use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

const EVENT_BATCH: usize = 64;

/// Poller backed by a kernel-side `epoll` interest set, in level-triggered
/// mode so a partially consumed buffer cannot get stuck.
///
/// The last-submitted event mask is tracked per fd; each step reconciles the
/// fds whose slots changed, choosing between `EPOLL_CTL_ADD`, `MOD` and
/// `DEL`. A closed fd leaves the kernel's interest set on its own, so the
/// registry's closed list invalidates the cached mask for that number before
/// the diff runs; `ENOENT` and `EEXIST` races are still recovered by
/// retrying with the opposite operation.
pub struct EpollPoller {
    handle: PollerHandle,
    epfd: RawFd,
    submitted: HashMap<RawFd, u32>,
    events: Vec<libc::epoll_event>,
}

impl Poller for EpollPoller {
    fn new() -> Result<Self> {
        let epfd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if epfd < 0 {
            return Err(Error::last_os_error());
        }

        Ok(Self {
            handle: PollerHandle::new(),
            epfd,
            submitted: HashMap::new(),
            events: vec![libc::epoll_event { events: 0, u64: 0 }; EVENT_BATCH],
        })
    }

    fn handle(&self) -> PollerHandle {
        self.handle.clone()
    }

    fn step(&mut self, max_block: Option<Duration>) -> Result<()> {
        let timeout = {
            let handle = self.handle.clone();
            let mut reg = handle.registry_mut();

            // Teardown first: close(2) already purged those kernel entries,
            // and the same numbers may reappear below as different sockets
            // with identical masks. Forgetting the cache is what forces a
            // fresh EPOLL_CTL_ADD instead of a no-op diff.
            for fd in reg.take_closed() {
                self.submitted.remove(&fd);
            }

            for fd in reg.take_dirty() {
                let (read, write) = reg.interest(fd);
                let mut mask: u32 = 0;
                if read {
                    mask |= libc::EPOLLIN as u32;
                }
                if write {
                    mask |= libc::EPOLLOUT as u32;
                }
                self.reconcile(fd, mask);
            }
            reg.kernel_timeout(max_block)
        };

        let ready = unsafe {
            libc::epoll_wait(
                self.epfd,
                self.events.as_mut_ptr(),
                self.events.len() as libc::c_int,
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

        for event in &self.events[..ready.max(0) as usize] {
            let fd = event.u64 as RawFd;
            let bits = event.events;
            let failed = bits & (libc::EPOLLERR | libc::EPOLLHUP) as u32 != 0;
            if failed || bits & libc::EPOLLIN as u32 != 0 {
                reg.wake_readable(fd);
            }
            if failed || bits & libc::EPOLLOUT as u32 != 0 {
                reg.wake_writable(fd);
            }
        }

        Ok(())
    }
}

impl EpollPoller {
    /// Brings the kernel's mask for `fd` in line with `mask`.
    fn reconcile(&mut self, fd: RawFd, mask: u32) {
        let submitted = self.submitted.get(&fd).copied().unwrap_or(0);
        if mask == submitted {
            return;
        }

        if mask == 0 {
            // The kernel drops closed fds on its own; a failed DEL is stale.
            let _ = self.ctl(libc::EPOLL_CTL_DEL, fd, 0);
            self.submitted.remove(&fd);
            return;
        }

        let result = if submitted == 0 {
            self.ctl(libc::EPOLL_CTL_ADD, fd, mask).or_else(|err| {
                if err.raw_os_error() == Some(libc::EEXIST) {
                    self.ctl(libc::EPOLL_CTL_MOD, fd, mask)
                } else {
                    Err(err)
                }
            })
        } else {
            self.ctl(libc::EPOLL_CTL_MOD, fd, mask).or_else(|err| {
                if err.raw_os_error() == Some(libc::ENOENT) {
                    self.ctl(libc::EPOLL_CTL_ADD, fd, mask)
                } else {
                    Err(err)
                }
            })
        };

        match result {
            Ok(()) => {
                self.submitted.insert(fd, mask);
            }
            Err(err) => {
                log::trace!("epoll_ctl on fd {fd} failed: {err}");
                self.submitted.remove(&fd);
            }
        }
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, mask: u32) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: mask,
            u64: fd as u64,
        };
        let ret = unsafe { libc::epoll_ctl(self.epfd, op, fd, &mut event) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }
}

impl Drop for EpollPoller {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.epfd);
        }
    }
}
