//! `select(2)` backend.

use super::registry::PollerHandle;
use super::Poller;
use crate::error::Result;

use std::io;
use std::mem;
use std::os::unix::io::RawFd;
use std::ptr;
use std::time::Duration;

/// Poller backed by `select(2)`.
///
/// The read/write fd_set bitmaps are rebuilt from the interest table on every
/// step, so one step costs O(max_fd). Descriptors at or above `FD_SETSIZE`
/// cannot be represented and registering one is a fatal precondition
/// violation.
pub struct SelectPoller {
    handle: PollerHandle,
}

impl Poller for SelectPoller {
    fn new() -> Result<Self> {
        Ok(Self {
            handle: PollerHandle::new(),
        })
    }

    fn handle(&self) -> PollerHandle {
        self.handle.clone()
    }

    fn step(&mut self, max_block: Option<Duration>) -> Result<()> {
        let mut read_set: libc::fd_set = unsafe { mem::zeroed() };
        let mut write_set: libc::fd_set = unsafe { mem::zeroed() };
        unsafe {
            libc::FD_ZERO(&mut read_set);
            libc::FD_ZERO(&mut write_set);
        }

        let mut max_fd: RawFd = -1;
        let timeout = {
            let mut reg = self.handle.registry_mut();
            // The bitmaps are rebuilt from the live table; the change log is
            // only for kernel-state backends.
            reg.discard_changes();
            for (fd, read, write) in reg.interests() {
                assert!(
                    (fd as usize) < libc::FD_SETSIZE as usize,
                    "fd {fd} exceeds FD_SETSIZE; use the poll or epoll backend"
                );
                if read {
                    unsafe { libc::FD_SET(fd, &mut read_set) };
                }
                if write {
                    unsafe { libc::FD_SET(fd, &mut write_set) };
                }
                max_fd = max_fd.max(fd);
            }
            reg.kernel_timeout(max_block)
        };

        let mut tv = timeval_ceil(timeout.unwrap_or(Duration::ZERO));
        let tv_ptr = match timeout {
            Some(_) => &mut tv as *mut libc::timeval,
            None => ptr::null_mut(),
        };

        let ready = unsafe {
            libc::select(
                max_fd + 1,
                &mut read_set,
                &mut write_set,
                ptr::null_mut(),
                tv_ptr,
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
            for fd in 0..=max_fd {
                if unsafe { libc::FD_ISSET(fd, &read_set) } {
                    reg.wake_readable(fd);
                }
                if unsafe { libc::FD_ISSET(fd, &write_set) } {
                    reg.wake_writable(fd);
                }
            }
        }

        Ok(())
    }
}

// Rounded up to the next microsecond so timers never fire early.
fn timeval_ceil(timeout: Duration) -> libc::timeval {
    let mut sec = timeout.as_secs();
    let mut usec = timeout.subsec_nanos().div_ceil(1_000) as u64;
    if usec == 1_000_000 {
        sec += 1;
        usec = 0;
    }

    libc::timeval {
        tv_sec: sec.min(libc::time_t::MAX as u64) as libc::time_t,
        tv_usec: usec as libc::suseconds_t,
    }
}
