//! Shared poller state: the interest table, the timer queue, and the cached
//! view of the monotonic clock.
//!
//! Every backend drives the same [`Registry`]. Sockets and futures reach it
//! through a cloned [`PollerHandle`]; the backend reaches it directly during
//! [`step`](crate::poller::Poller::step). At most one waiter may occupy a
//! given (fd, direction) slot: re-arming by the same task is legal,
//! registering a second task on an occupied slot is a programming error and
//! panics.

use crate::time::{Sleep, Time};

use std::cell::{RefCell, RefMut};
use std::collections::{BTreeMap, HashMap};
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::task::Waker;
use std::time::{Duration, Instant};

/// Identifies a scheduled timer for cancellation.
///
/// Ordered by deadline ascending, insertion order breaking ties, so the timer
/// queue key doubles as the cancellation token.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct TimerId {
    deadline: Instant,
    seq: u64,
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum Direction {
    Read,
    Write,
}

#[derive(Default)]
struct IoSlots {
    read: Option<Waker>,
    write: Option<Waker>,
}

pub(crate) struct Registry {
    slots: HashMap<RawFd, IoSlots>,
    /// Fds whose slots changed since the backend last reconciled. Only the
    /// kernel-state backend (epoll) consumes this; rebuild-per-step backends
    /// discard it.
    dirty: Vec<RawFd>,
    /// Fds torn down since the backend last reconciled. A slot change alone
    /// cannot stand in for this: teardown closes the fd, and the number can
    /// come back as a different socket with the same interests before the
    /// backend looks again. Whatever the backend cached for the number must
    /// be forgotten, not diffed.
    closed: Vec<RawFd>,
    timers: BTreeMap<TimerId, Waker>,
    next_seq: u64,
    now: Instant,
}

impl Registry {
    fn new() -> Self {
        Self {
            slots: HashMap::new(),
            dirty: Vec::new(),
            closed: Vec::new(),
            timers: BTreeMap::new(),
            next_seq: 0,
            now: Instant::now(),
        }
    }

    fn add(&mut self, fd: RawFd, dir: Direction, waker: &Waker) {
        let slots = self.slots.entry(fd).or_default();
        let slot = match dir {
            Direction::Read => &mut slots.read,
            Direction::Write => &mut slots.write,
        };

        if let Some(existing) = slot {
            assert!(
                existing.will_wake(waker),
                "fd {fd} already has a pending {dir:?} waiter"
            );
        }

        *slot = Some(waker.clone());
        self.dirty.push(fd);
    }

    // Returns the displaced waker so the caller can drop it outside the borrow.
    fn clear(&mut self, fd: RawFd, dir: Direction) -> Option<Waker> {
        let slots = self.slots.get_mut(&fd)?;
        let taken = match dir {
            Direction::Read => slots.read.take(),
            Direction::Write => slots.write.take(),
        };

        if slots.read.is_none() && slots.write.is_none() {
            self.slots.remove(&fd);
        }
        self.dirty.push(fd);

        taken
    }

    // Socket teardown: the caller closes the fd right after, so the number
    // is reported on the closed list even when no slot was occupied. The
    // backend may still hold kernel state for it from an earlier step.
    fn remove(&mut self, fd: RawFd) -> Vec<Waker> {
        let mut displaced = Vec::new();
        if let Some(slots) = self.slots.remove(&fd) {
            displaced.extend(slots.read);
            displaced.extend(slots.write);
        }
        self.dirty.push(fd);
        self.closed.push(fd);

        displaced
    }

    fn add_timer(&mut self, deadline: Instant, waker: Waker) -> TimerId {
        let id = TimerId {
            deadline,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.timers.insert(id, waker);

        id
    }

    fn cancel_timer(&mut self, id: TimerId) -> Option<Waker> {
        self.timers.remove(&id)
    }

    pub(crate) fn now(&self) -> Instant {
        self.now
    }

    pub(crate) fn refresh_now(&mut self) -> Instant {
        self.now = Instant::now();
        self.now
    }

    /// Wakes every timer whose deadline is at or before the cached `now`.
    pub(crate) fn wake_expired_timers(&mut self) {
        loop {
            let due = match self.timers.keys().next() {
                Some(id) if id.deadline <= self.now => *id,
                _ => return,
            };
            if let Some(waker) = self.timers.remove(&due) {
                waker.wake();
            }
        }
    }

    /// Wakes and clears the read waiter of `fd`, if any.
    pub(crate) fn wake_readable(&mut self, fd: RawFd) {
        if let Some(waker) = self.clear(fd, Direction::Read) {
            waker.wake();
        }
    }

    /// Wakes and clears the write waiter of `fd`, if any.
    pub(crate) fn wake_writable(&mut self, fd: RawFd) {
        if let Some(waker) = self.clear(fd, Direction::Write) {
            waker.wake();
        }
    }

    /// Interest snapshot for rebuild-per-step backends: (fd, read, write).
    pub(crate) fn interests(&self) -> impl Iterator<Item = (RawFd, bool, bool)> + '_ {
        self.slots
            .iter()
            .map(|(&fd, s)| (fd, s.read.is_some(), s.write.is_some()))
    }

    /// Current interest of a single fd: (read, write).
    pub(crate) fn interest(&self, fd: RawFd) -> (bool, bool) {
        match self.slots.get(&fd) {
            Some(s) => (s.read.is_some(), s.write.is_some()),
            None => (false, false),
        }
    }

    pub(crate) fn take_dirty(&mut self) -> Vec<RawFd> {
        std::mem::take(&mut self.dirty)
    }

    /// Fds closed since the last reconcile, in teardown order.
    pub(crate) fn take_closed(&mut self) -> Vec<RawFd> {
        std::mem::take(&mut self.closed)
    }

    /// Rebuild-per-step backends reconstruct their interest sets from the
    /// live table; they call this so the change log does not grow without
    /// bound.
    pub(crate) fn discard_changes(&mut self) {
        self.dirty.clear();
        self.closed.clear();
    }

    /// How long the backend may block in the kernel.
    ///
    /// `None` means indefinitely. The result never exceeds `cap` or the time
    /// until the nearest timer deadline; with nothing registered at all the
    /// poller is idle and must not block.
    pub(crate) fn kernel_timeout(&self, cap: Option<Duration>) -> Option<Duration> {
        let until_timer = self
            .timers
            .keys()
            .next()
            .map(|id| id.deadline.saturating_duration_since(self.now));

        match (until_timer, cap) {
            (Some(t), Some(c)) => Some(t.min(c)),
            (Some(t), None) => Some(t),
            (None, Some(c)) => Some(c),
            (None, None) => {
                if self.slots.is_empty() {
                    Some(Duration::ZERO)
                } else {
                    None
                }
            }
        }
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.slots.is_empty() && self.timers.is_empty()
    }
}

/// Cloneable handle to a poller's shared state.
///
/// Sockets keep one to register interests and timers; the loop hands one out
/// via [`Loop::poller`](crate::runtime::Loop::poller). All operations are
/// non-blocking.
#[derive(Clone)]
pub struct PollerHandle {
    registry: Rc<RefCell<Registry>>,
}

impl PollerHandle {
    pub(crate) fn new() -> Self {
        Self {
            registry: Rc::new(RefCell::new(Registry::new())),
        }
    }

    pub(crate) fn registry_mut(&self) -> RefMut<'_, Registry> {
        self.registry.borrow_mut()
    }

    /// Registers `waker` for read readiness of `fd`.
    ///
    /// The slot must be empty or already held by the same task.
    pub(crate) fn add_read(&self, fd: RawFd, waker: &Waker) {
        self.registry
            .borrow_mut()
            .add(fd, Direction::Read, waker);
    }

    /// Registers `waker` for write readiness of `fd`.
    pub(crate) fn add_write(&self, fd: RawFd, waker: &Waker) {
        self.registry
            .borrow_mut()
            .add(fd, Direction::Write, waker);
    }

    pub(crate) fn clear_read(&self, fd: RawFd) {
        // Displaced waker dropped after the borrow is released.
        let _waker = self.registry.borrow_mut().clear(fd, Direction::Read);
    }

    pub(crate) fn clear_write(&self, fd: RawFd) {
        let _waker = self.registry.borrow_mut().clear(fd, Direction::Write);
    }

    /// Drops both direction slots of `fd`. Called from socket teardown,
    /// before the fd is closed, so a reused fd number cannot inherit stale
    /// registrations.
    pub(crate) fn remove(&self, fd: RawFd) {
        let _wakers = self.registry.borrow_mut().remove(fd);
    }

    /// Schedules a wake at `deadline`.
    pub(crate) fn add_timer(&self, deadline: Time, waker: Waker) -> TimerId {
        self.registry.borrow_mut().add_timer(deadline, waker)
    }

    /// Best-effort removal of a scheduled timer; safe if it already fired.
    pub(crate) fn cancel_timer(&self, id: TimerId) {
        let _waker = self.registry.borrow_mut().cancel_timer(id);
    }

    /// The monotonic timestamp cached for the current step.
    pub fn now(&self) -> Time {
        self.registry.borrow().now()
    }

    /// An awaitable delay, resolved by this poller's timer queue.
    pub fn sleep(&self, duration: Duration) -> Sleep {
        Sleep::new(self.clone(), Instant::now() + duration)
    }

    /// Releases every registered waker so parked tasks can unwind.
    ///
    /// The wakers are collected first and dropped only after the registry
    /// borrow is released: dropping a waker can drop its task, whose future
    /// destructors call back into the registry.
    pub(crate) fn drain_registrations(&self) {
        let wakers = {
            let mut reg = self.registry.borrow_mut();
            let mut wakers: Vec<Waker> = Vec::new();
            let fds: Vec<RawFd> = reg.slots.keys().copied().collect();
            for fd in fds {
                wakers.extend(reg.remove(fd));
            }
            let timers = std::mem::take(&mut reg.timers);
            wakers.extend(timers.into_values());
            reg.discard_changes();
            wakers
        };
        drop(wakers);
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.registry.borrow().is_idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::task::{RawWaker, RawWakerVTable, Waker};
    use std::time::Duration;

    fn noop_waker() -> Waker {
        fn clone(_: *const ()) -> RawWaker {
            RawWaker::new(std::ptr::null(), &VTABLE)
        }
        fn noop(_: *const ()) {}
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
        unsafe { Waker::from_raw(RawWaker::new(std::ptr::null(), &VTABLE)) }
    }

    #[test]
    fn timer_ids_order_by_deadline_then_insertion() {
        let handle = PollerHandle::new();
        let base = handle.now();
        let later = handle.add_timer(base + Duration::from_millis(20), noop_waker());
        let early_a = handle.add_timer(base + Duration::from_millis(5), noop_waker());
        let early_b = handle.add_timer(base + Duration::from_millis(5), noop_waker());

        assert!(early_a < early_b);
        assert!(early_b < later);
    }

    #[test]
    fn cancel_is_safe_after_fire() {
        let handle = PollerHandle::new();
        let id = handle.add_timer(handle.now(), noop_waker());
        {
            let mut reg = handle.registry_mut();
            reg.refresh_now();
            reg.wake_expired_timers();
        }
        handle.cancel_timer(id);
        assert!(handle.is_idle());
    }

    #[test]
    fn idle_poller_does_not_block() {
        let handle = PollerHandle::new();
        assert_eq!(
            handle.registry_mut().kernel_timeout(None),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn clearing_both_directions_drops_the_interest() {
        let handle = PollerHandle::new();
        let waker = noop_waker();
        handle.add_read(7, &waker);
        handle.add_write(7, &waker);
        assert_eq!(handle.registry_mut().interest(7), (true, true));

        handle.clear_read(7);
        handle.clear_write(7);
        assert_eq!(handle.registry_mut().interest(7), (false, false));
        assert!(handle.is_idle());
    }

    #[test]
    fn teardown_is_reported_even_when_interests_look_unchanged() {
        let handle = PollerHandle::new();
        let waker = noop_waker();

        // Old socket registered, torn down, and the number reused by a new
        // socket with the same interest before anyone reconciled.
        handle.add_read(9, &waker);
        handle.remove(9);
        handle.add_read(9, &waker);

        let mut reg = handle.registry_mut();
        assert_eq!(reg.take_closed(), vec![9]);
        assert!(reg.take_dirty().contains(&9));
        assert_eq!(reg.interest(9), (true, false));
    }
}
