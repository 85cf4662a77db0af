//! Thread-local loop context for global task spawning.
//!
//! [`Task::spawn`](crate::task::Task::spawn) needs the current loop's run
//! queue without an explicit handle. The loop enters a context around every
//! resumption phase and around [`Loop::spawn`](crate::runtime::Loop::spawn);
//! the previous context is restored on exit, so nested loops on one thread
//! stay separate.

use crate::runtime::queue::RunQueue;

use std::cell::RefCell;
use std::rc::Rc;

thread_local! {
    static CURRENT_QUEUE: RefCell<Option<Rc<RunQueue>>> = const { RefCell::new(None) };
}

pub(crate) fn enter_context<F, R>(queue: Rc<RunQueue>, function: F) -> R
where
    F: FnOnce() -> R,
{
    CURRENT_QUEUE.with(|current| {
        let previous = current.borrow_mut().replace(queue);
        let result = function();
        *current.borrow_mut() = previous;

        result
    })
}

pub(crate) fn current_queue() -> Rc<RunQueue> {
    CURRENT_QUEUE.with(|current| {
        current
            .borrow()
            .clone()
            .expect("Task::spawn() called outside of a loop context")
    })
}
