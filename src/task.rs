//! Detached suspendable computations.
//!
//! A [`Task`] wraps a future together with its completion state. Spawning
//! runs the future immediately up to its first suspension; after that the
//! loop re-polls it whenever one of its registrations wakes it. Tasks are
//! fire-and-forget: dropping the [`JoinHandle`] detaches the task, and a
//! task dropped before completion (when its loop is torn down) releases its
//! frame, whose destructors cancel any outstanding registrations.
//!
//! Failures inside a task are ordinary [`Result`](crate::Result) values; the
//! runtime neither logs nor propagates them.

use crate::runtime::context::current_queue;
use crate::runtime::queue::RunQueue;
use crate::runtime::waker::{local_waker, LocalWake};

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

pub struct Task<T> {
    future: RefCell<Option<Pin<Box<dyn Future<Output = T>>>>>,
    result: RefCell<Option<T>>,
    queue: Rc<RunQueue>,
    completed: Cell<bool>,
    waiters: RefCell<Vec<Waker>>,
}

impl<T: 'static> Task<T> {
    pub(crate) fn new<F>(future: F, queue: Rc<RunQueue>) -> Rc<Self>
    where
        F: Future<Output = T> + 'static,
    {
        Rc::new(Task {
            future: RefCell::new(Some(Box::pin(future))),
            result: RefCell::new(None),
            queue,
            completed: Cell::new(false),
            waiters: RefCell::new(Vec::new()),
        })
    }

    /// Polls the wrapped future once. A wake that arrives after completion
    /// (a stale registration) finds the future slot empty and is a no-op.
    pub(crate) fn poll(self: &Rc<Self>) {
        let waker = local_waker(self.clone());
        let mut context = Context::from_waker(&waker);

        let mut future_slot = self.future.borrow_mut();

        if let Some(mut future) = future_slot.take() {
            match future.as_mut().poll(&mut context) {
                Poll::Pending => {
                    *future_slot = Some(future);
                }
                Poll::Ready(value) => {
                    drop(future_slot);
                    *self.result.borrow_mut() = Some(value);
                    self.completed.set(true);

                    for w in self.waiters.borrow_mut().drain(..) {
                        w.wake();
                    }
                }
            }
        }
    }

    /// Launches a detached task on the current loop.
    ///
    /// The future starts executing immediately and runs until its first
    /// suspension point before `spawn` returns.
    ///
    /// # Panics
    /// Panics if called outside of a loop context (a running task or
    /// [`Loop::spawn`](crate::runtime::Loop::spawn)).
    pub fn spawn<F>(future: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + 'static,
    {
        let queue = current_queue();
        let task = Task::new(future, queue);
        Task::poll(&task);

        JoinHandle { task }
    }
}

pub(crate) trait Runnable {
    fn poll(self: Rc<Self>);
}

impl<T: 'static> Runnable for Task<T> {
    fn poll(self: Rc<Self>) {
        Task::poll(&self);
    }
}

/// The task is its own wake target: waking puts it back on the run queue,
/// where the executor polls it during the next resumption phase.
impl<T: 'static> LocalWake for Task<T> {
    fn wake(self: Rc<Self>) {
        let queue = self.queue.clone();
        queue.push(self);
    }
}

/// Observes a spawned task. Dropping the handle detaches the task without
/// stopping it.
pub struct JoinHandle<T> {
    task: Rc<Task<T>>,
}

impl<T> JoinHandle<T> {
    pub fn is_finished(&self) -> bool {
        self.task.completed.get()
    }
}

impl<T: 'static> Future for JoinHandle<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.task.completed.get() {
            let result = self
                .task
                .result
                .borrow_mut()
                .take()
                .expect("task completed but result missing");

            return Poll::Ready(result);
        }

        self.task.waiters.borrow_mut().push(cx.waker().clone());

        Poll::Pending
    }
}
