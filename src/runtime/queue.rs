//! FIFO queue of runnable tasks.
//!
//! Wakers push tasks here; the executor pops them during the resumption
//! phase of each step. Single-threaded, so a `RefCell` suffices.

use crate::task::Runnable;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

pub(crate) struct RunQueue {
    queue: RefCell<VecDeque<Rc<dyn Runnable>>>,
}

impl RunQueue {
    pub(crate) fn new() -> Self {
        Self {
            queue: RefCell::new(VecDeque::new()),
        }
    }

    pub(crate) fn push(&self, task: Rc<dyn Runnable>) {
        self.queue.borrow_mut().push_back(task);
    }

    pub(crate) fn pop(&self) -> Option<Rc<dyn Runnable>> {
        self.queue.borrow_mut().pop_front()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }
}
