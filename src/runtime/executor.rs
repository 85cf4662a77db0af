//! Resumption phase: drains the run queue.

use crate::runtime::context::enter_context;
use crate::runtime::queue::RunQueue;

use std::rc::Rc;

pub(crate) struct Executor {
    queue: Rc<RunQueue>,
}

impl Executor {
    pub(crate) fn new(queue: Rc<RunQueue>) -> Self {
        Self { queue }
    }

    /// Runs every runnable task to its next suspension point.
    ///
    /// Tasks woken while draining (by another task finishing, for instance)
    /// run within the same call; registrations they make participate in the
    /// next poller step.
    pub(crate) fn run(&self) {
        enter_context(self.queue.clone(), || {
            while let Some(task) = self.queue.pop() {
                task.poll();
            }
        });
    }
}
