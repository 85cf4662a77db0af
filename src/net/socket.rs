//! The user-facing socket handle.

use crate::addr::Address;
use crate::error::{Error, Result};
use crate::net::future::{AcceptFuture, ConnectFuture, ReadFuture, WriteFuture};
use crate::poller::PollerHandle;

use std::mem;
use std::os::unix::io::RawFd;

const DEFAULT_BACKLOG: libc::c_int = 128;

/// A non-blocking IPv4 TCP socket tied to a poller.
///
/// The socket exclusively owns its file descriptor: dropping it unregisters
/// the fd from the poller and closes it. There is no copy; handing a socket
/// to another task moves the fd with it.
///
/// For locally created sockets [`addr`](Self::addr) is the bind/connect
/// target; for accepted sockets it is the peer.
pub struct Socket {
    fd: RawFd,
    addr: Address,
    poller: PollerHandle,
}

impl Socket {
    /// Creates a fresh non-blocking TCP socket aimed at `addr`.
    ///
    /// Non-blocking mode is set here; on platforms that support it the
    /// socket also opts out of `SIGPIPE` so failed writes surface as errors
    /// instead of signals. (On Linux the same is achieved per send with
    /// `MSG_NOSIGNAL`.)
    pub fn new(addr: Address, poller: &PollerHandle) -> Result<Self> {
        let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM, 0) };
        if fd < 0 {
            return Err(Error::last_os_error());
        }

        // Construct first so the fd is closed if setup fails below.
        let socket = Self {
            fd,
            addr,
            poller: poller.clone(),
        };
        set_nonblocking(fd)?;
        set_nosigpipe(fd)?;

        Ok(socket)
    }

    /// Wraps a descriptor returned by `accept`, with `peer` as its address.
    pub(crate) fn from_accepted(fd: RawFd, peer: Address, poller: PollerHandle) -> Result<Self> {
        let socket = Self {
            fd,
            addr: peer,
            poller,
        };
        set_nonblocking(fd)?;
        set_nosigpipe(fd)?;

        Ok(socket)
    }

    /// Binds to the held address. Synchronous.
    ///
    /// `SO_REUSEADDR` is set first so a restarted server can reclaim its
    /// port without waiting out TIME_WAIT.
    pub fn bind(&self) -> Result<()> {
        let reuse: libc::c_int = 1;
        let ret = unsafe {
            libc::setsockopt(
                self.fd,
                libc::SOL_SOCKET,
                libc::SO_REUSEADDR,
                &reuse as *const _ as *const libc::c_void,
                mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(Error::last_os_error());
        }

        let raw = self.addr.sockaddr();
        let ret = unsafe {
            libc::bind(
                self.fd,
                &raw as *const _ as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(Error::last_os_error());
        }

        Ok(())
    }

    /// Starts listening with the default backlog. Synchronous.
    pub fn listen(&self) -> Result<()> {
        self.listen_backlog(DEFAULT_BACKLOG)
    }

    pub fn listen_backlog(&self, backlog: i32) -> Result<()> {
        let ret = unsafe { libc::listen(self.fd, backlog) };
        if ret < 0 {
            return Err(Error::last_os_error());
        }

        Ok(())
    }

    /// Waits for an incoming connection and returns a fresh socket owning
    /// it, peer address populated.
    pub fn accept(&self) -> AcceptFuture<'_> {
        AcceptFuture::new(self)
    }

    /// Initiates a non-blocking connect to the held address and waits for
    /// it to finish; failure carries the code reported by `SO_ERROR`.
    pub fn connect(&self) -> ConnectFuture<'_> {
        ConnectFuture::new(self)
    }

    /// Waits for read readiness and performs one `recv`.
    ///
    /// Resolves to the byte count; `Ok(0)` means the peer shut down
    /// writing.
    pub fn read_some<'a>(&'a self, buf: &'a mut [u8]) -> ReadFuture<'a> {
        ReadFuture::new(self, buf)
    }

    /// Waits for write readiness and performs one `send`.
    ///
    /// Partial writes are the caller's responsibility; see
    /// [`write_all`](Self::write_all) for the common loop.
    pub fn write_some<'a>(&'a self, buf: &'a [u8]) -> WriteFuture<'a> {
        WriteFuture::new(self, buf)
    }

    /// Writes the whole buffer, looping over partial writes.
    pub async fn write_all(&self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let written = self.write_some(buf).await?;
            buf = &buf[written..];
        }

        Ok(())
    }

    /// The address this socket was created with: the bind/connect target,
    /// or the peer for accepted sockets.
    pub fn addr(&self) -> &Address {
        &self.addr
    }

    /// The locally bound address, from `getsockname`. Useful after binding
    /// to port 0.
    pub fn local_addr(&self) -> Result<Address> {
        let mut raw: libc::sockaddr_in = unsafe { mem::zeroed() };
        let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
        let ret = unsafe {
            libc::getsockname(self.fd, &mut raw as *mut _ as *mut libc::sockaddr, &mut len)
        };
        if ret < 0 {
            return Err(Error::last_os_error());
        }

        Ok(Address::from_sockaddr(&raw))
    }

    pub fn poller(&self) -> &PollerHandle {
        &self.poller
    }

    pub(crate) fn fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        // Unregister before close so a reused fd number cannot receive this
        // socket's stale events.
        self.poller.remove(self.fd);
        unsafe {
            libc::close(self.fd);
        }
    }
}

fn set_nonblocking(fd: RawFd) -> Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(Error::last_os_error());
    }
    let ret = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if ret < 0 {
        return Err(Error::last_os_error());
    }

    Ok(())
}

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "dragonfly"
))]
fn set_nosigpipe(fd: RawFd) -> Result<()> {
    let on: libc::c_int = 1;
    let ret = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_NOSIGPIPE,
            &on as *const _ as *const libc::c_void,
            mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(Error::last_os_error());
    }

    Ok(())
}

#[cfg(not(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "dragonfly"
)))]
fn set_nosigpipe(_fd: RawFd) -> Result<()> {
    Ok(())
}
