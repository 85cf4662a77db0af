//! The event loop.

use crate::error::Result;
use crate::poller::{Poller, PollerHandle};
use crate::runtime::context::enter_context;
use crate::runtime::executor::Executor;
use crate::runtime::queue::RunQueue;
use crate::task::{JoinHandle, Task};

use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

/// Single-threaded event loop over a poller backend.
///
/// One [`step`](Self::step) blocks in the poller until a readiness event or
/// the nearest timer deadline, then runs every woken task to its next
/// suspension point. Resumptions are synchronous on the loop thread, so a
/// task resumed later in a step observes everything a task resumed earlier
/// in the same step did.
///
/// # Example
///
/// ```ignore
/// let mut lp = Loop::<SelectPoller>::new()?;
/// let handle = lp.spawn(async { 42 });
/// while !handle.is_finished() {
///     lp.step()?;
/// }
/// ```
pub struct Loop<P: Poller> {
    poller: P,
    queue: Rc<RunQueue>,
    executor: Executor,
}

impl<P: Poller> Loop<P> {
    pub fn new() -> Result<Self> {
        let poller = P::new()?;
        let queue = Rc::new(RunQueue::new());
        let executor = Executor::new(queue.clone());

        Ok(Self {
            poller,
            queue,
            executor,
        })
    }

    /// The handle sockets and sleeps register through.
    pub fn poller(&self) -> PollerHandle {
        self.poller.handle()
    }

    /// Launches a task on this loop; it executes up to its first suspension
    /// before `spawn` returns.
    pub fn spawn<T, F>(&self, future: F) -> JoinHandle<T>
    where
        T: 'static,
        F: Future<Output = T> + 'static,
    {
        enter_context(self.queue.clone(), || Task::spawn(future))
    }

    /// Performs one loop iteration: block in the poller, then resume every
    /// waiter whose condition fired.
    ///
    /// With tasks already runnable the poller is given a zero block budget
    /// so their wakes are collected without delay.
    pub fn step(&mut self) -> Result<()> {
        let max_block = if self.queue.is_empty() {
            None
        } else {
            Some(Duration::ZERO)
        };

        self.poller.step(max_block)?;
        self.executor.run();

        Ok(())
    }

    /// Steps until the loop is idle: no runnable tasks, no I/O interests,
    /// no timers.
    ///
    /// A server that keeps a listening socket registered never goes idle,
    /// so this effectively runs forever for the usual accept-loop setup.
    pub fn run(&mut self) -> Result<()> {
        while !self.is_idle() {
            self.step()?;
        }

        Ok(())
    }

    fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.poller.handle().is_idle()
    }
}

impl<P: Poller> Drop for Loop<P> {
    fn drop(&mut self) {
        // Release parked tasks so their frames unwind while the poller is
        // still alive; their destructors deregister through the handle.
        self.poller.handle().drain_registrations();
    }
}
