//! Suspendable socket operations.
//!
//! Each future attempts its syscall first and only suspends when the kernel
//! reports `EAGAIN`/`EWOULDBLOCK`, registering the task's waker for the
//! relevant direction. `EINTR` retries immediately.
//!
//! Every future takes an optional deadline via [`deadline`](ReadFuture::deadline).
//! A deadline-bounded operation holds two registrations, one I/O interest
//! and one timer, and whichever fires first removes the other before the
//! task continues, so the loser can never resume the task a second time.
//! Dropping a pending future removes both registrations as well.

use crate::addr::Address;
use crate::error::{errno, Error, Result};
use crate::net::socket::Socket;
use crate::poller::TimerId;
use crate::time::Time;

use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

#[cfg(target_os = "linux")]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(not(target_os = "linux"))]
const SEND_FLAGS: libc::c_int = 0;

/// Bookkeeping shared by all four futures: the optional deadline, its timer
/// registration, and whether an I/O slot is currently armed.
struct Waiting {
    deadline: Option<Time>,
    timer: Option<TimerId>,
    registered: bool,
}

impl Waiting {
    fn new() -> Self {
        Self {
            deadline: None,
            timer: None,
            registered: false,
        }
    }

    fn expired(&self, socket: &Socket) -> bool {
        match self.deadline {
            Some(deadline) => socket.poller().now() >= deadline,
            None => false,
        }
    }

    fn arm_read(&mut self, socket: &Socket, waker: &Waker) {
        socket.poller().add_read(socket.fd(), waker);
        self.registered = true;
        self.arm_timer(socket, waker);
    }

    fn arm_write(&mut self, socket: &Socket, waker: &Waker) {
        socket.poller().add_write(socket.fd(), waker);
        self.registered = true;
        self.arm_timer(socket, waker);
    }

    fn arm_timer(&mut self, socket: &Socket, waker: &Waker) {
        if let Some(deadline) = self.deadline {
            if self.timer.is_none() {
                self.timer = Some(socket.poller().add_timer(deadline, waker.clone()));
            }
        }
    }

    /// Removes both registrations. Idempotent, so the future's destructor
    /// can call it again after completion without touching a successor's
    /// slots.
    fn disarm_read(&mut self, socket: &Socket) {
        if self.registered {
            socket.poller().clear_read(socket.fd());
            self.registered = false;
        }
        if let Some(id) = self.timer.take() {
            socket.poller().cancel_timer(id);
        }
    }

    fn disarm_write(&mut self, socket: &Socket) {
        if self.registered {
            socket.poller().clear_write(socket.fd());
            self.registered = false;
        }
        if let Some(id) = self.timer.take() {
            socket.poller().cancel_timer(id);
        }
    }
}

/// Future returned by [`Socket::accept`].
pub struct AcceptFuture<'a> {
    socket: &'a Socket,
    waiting: Waiting,
}

impl<'a> AcceptFuture<'a> {
    pub(crate) fn new(socket: &'a Socket) -> Self {
        Self {
            socket,
            waiting: Waiting::new(),
        }
    }

    /// Fails with [`Error::Timeout`] if no connection arrives by `at`.
    pub fn deadline(mut self, at: Time) -> Self {
        self.waiting.deadline = Some(at);
        self
    }
}

impl Future for AcceptFuture<'_> {
    type Output = Result<Socket>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        loop {
            let mut raw: libc::sockaddr_in = unsafe { mem::zeroed() };
            let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
            let fd = unsafe {
                libc::accept(
                    this.socket.fd(),
                    &mut raw as *mut _ as *mut libc::sockaddr,
                    &mut len,
                )
            };

            if fd >= 0 {
                this.waiting.disarm_read(this.socket);
                let peer = Address::from_sockaddr(&raw);
                return Poll::Ready(Socket::from_accepted(
                    fd,
                    peer,
                    this.socket.poller().clone(),
                ));
            }

            let err = errno();
            if err == libc::EINTR {
                continue;
            }
            if err == libc::EAGAIN || err == libc::EWOULDBLOCK {
                break;
            }

            this.waiting.disarm_read(this.socket);
            return Poll::Ready(Err(Error::System(err)));
        }

        if this.waiting.expired(this.socket) {
            this.waiting.disarm_read(this.socket);
            return Poll::Ready(Err(Error::Timeout));
        }

        this.waiting.arm_read(this.socket, cx.waker());
        Poll::Pending
    }
}

impl Drop for AcceptFuture<'_> {
    fn drop(&mut self) {
        self.waiting.disarm_read(self.socket);
    }
}

/// Future returned by [`Socket::connect`].
pub struct ConnectFuture<'a> {
    socket: &'a Socket,
    waiting: Waiting,
    started: bool,
}

impl<'a> ConnectFuture<'a> {
    pub(crate) fn new(socket: &'a Socket) -> Self {
        Self {
            socket,
            waiting: Waiting::new(),
            started: false,
        }
    }

    /// Fails with [`Error::Timeout`] if the connection is not established by
    /// `at`. The socket is left in an indeterminate connect state; callers
    /// typically close it.
    pub fn deadline(mut self, at: Time) -> Self {
        self.waiting.deadline = Some(at);
        self
    }
}

impl Future for ConnectFuture<'_> {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let fd = this.socket.fd();

        if !this.started {
            let raw = this.socket.addr().sockaddr();
            let ret = unsafe {
                libc::connect(
                    fd,
                    &raw as *const _ as *const libc::sockaddr,
                    mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
                )
            };
            this.started = true;

            if ret == 0 {
                return Poll::Ready(Ok(()));
            }

            let err = errno();
            // EINTR leaves the connect proceeding in the background, same as
            // EINPROGRESS.
            if err == libc::EINPROGRESS || err == libc::EINTR {
                this.waiting.arm_write(this.socket, cx.waker());
                return Poll::Pending;
            }

            return Poll::Ready(Err(Error::System(err)));
        }

        if this.waiting.expired(this.socket) {
            this.waiting.disarm_write(this.socket);
            return Poll::Ready(Err(Error::Timeout));
        }

        // Write readiness reports the outcome; getpeername tells an
        // established connection apart from a wake that raced the handshake.
        let mut raw: libc::sockaddr_in = unsafe { mem::zeroed() };
        let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
        let ret =
            unsafe { libc::getpeername(fd, &mut raw as *mut _ as *mut libc::sockaddr, &mut len) };
        if ret == 0 {
            this.waiting.disarm_write(this.socket);
            return Poll::Ready(Ok(()));
        }

        let mut so_error: libc::c_int = 0;
        let mut so_len = mem::size_of::<libc::c_int>() as libc::socklen_t;
        let ret = unsafe {
            libc::getsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_ERROR,
                &mut so_error as *mut _ as *mut libc::c_void,
                &mut so_len,
            )
        };
        if ret < 0 {
            this.waiting.disarm_write(this.socket);
            return Poll::Ready(Err(Error::last_os_error()));
        }
        if so_error != 0 {
            this.waiting.disarm_write(this.socket);
            return Poll::Ready(Err(Error::System(so_error)));
        }

        // Still in progress; the wake was spurious.
        this.waiting.arm_write(this.socket, cx.waker());
        Poll::Pending
    }
}

impl Drop for ConnectFuture<'_> {
    fn drop(&mut self) {
        self.waiting.disarm_write(self.socket);
    }
}

/// Future returned by [`Socket::read_some`].
pub struct ReadFuture<'a> {
    socket: &'a Socket,
    buf: &'a mut [u8],
    waiting: Waiting,
}

impl<'a> ReadFuture<'a> {
    pub(crate) fn new(socket: &'a Socket, buf: &'a mut [u8]) -> Self {
        Self {
            socket,
            buf,
            waiting: Waiting::new(),
        }
    }

    /// Fails with [`Error::Timeout`] if no data arrives by `at`. The socket
    /// stays usable afterwards.
    pub fn deadline(mut self, at: Time) -> Self {
        self.waiting.deadline = Some(at);
        self
    }
}

impl Future for ReadFuture<'_> {
    type Output = Result<usize>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        loop {
            let received = unsafe {
                libc::recv(
                    this.socket.fd(),
                    this.buf.as_mut_ptr() as *mut libc::c_void,
                    this.buf.len(),
                    0,
                )
            };

            if received >= 0 {
                this.waiting.disarm_read(this.socket);
                return Poll::Ready(Ok(received as usize));
            }

            let err = errno();
            if err == libc::EINTR {
                continue;
            }
            if err == libc::EAGAIN || err == libc::EWOULDBLOCK {
                break;
            }

            this.waiting.disarm_read(this.socket);
            return Poll::Ready(Err(Error::System(err)));
        }

        if this.waiting.expired(this.socket) {
            this.waiting.disarm_read(this.socket);
            return Poll::Ready(Err(Error::Timeout));
        }

        this.waiting.arm_read(this.socket, cx.waker());
        Poll::Pending
    }
}

impl Drop for ReadFuture<'_> {
    fn drop(&mut self) {
        self.waiting.disarm_read(self.socket);
    }
}

/// Future returned by [`Socket::write_some`].
pub struct WriteFuture<'a> {
    socket: &'a Socket,
    buf: &'a [u8],
    waiting: Waiting,
}

impl<'a> WriteFuture<'a> {
    pub(crate) fn new(socket: &'a Socket, buf: &'a [u8]) -> Self {
        Self {
            socket,
            buf,
            waiting: Waiting::new(),
        }
    }

    /// Fails with [`Error::Timeout`] if the socket does not become writable
    /// by `at`. The socket stays usable afterwards.
    pub fn deadline(mut self, at: Time) -> Self {
        self.waiting.deadline = Some(at);
        self
    }
}

impl Future for WriteFuture<'_> {
    type Output = Result<usize>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        loop {
            let sent = unsafe {
                libc::send(
                    this.socket.fd(),
                    this.buf.as_ptr() as *const libc::c_void,
                    this.buf.len(),
                    SEND_FLAGS,
                )
            };

            if sent >= 0 {
                this.waiting.disarm_write(this.socket);
                return Poll::Ready(Ok(sent as usize));
            }

            let err = errno();
            if err == libc::EINTR {
                continue;
            }
            if err == libc::EAGAIN || err == libc::EWOULDBLOCK {
                break;
            }

            this.waiting.disarm_write(this.socket);
            return Poll::Ready(Err(Error::System(err)));
        }

        if this.waiting.expired(this.socket) {
            this.waiting.disarm_write(this.socket);
            return Poll::Ready(Err(Error::Timeout));
        }

        this.waiting.arm_write(this.socket, cx.waker());
        Poll::Pending
    }
}

impl Drop for WriteFuture<'_> {
    fn drop(&mut self) {
        self.waiting.disarm_write(self.socket);
    }
}
