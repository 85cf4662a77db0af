//! Awaitable delays backed by the poller's timer queue.

use crate::poller::{PollerHandle, TimerId};
use crate::time::Time;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A future that completes once the monotonic clock reaches its deadline,
/// never earlier.
///
/// The timer is registered lazily on the first poll and canceled if the
/// future is dropped before it fires.
pub struct Sleep {
    poller: PollerHandle,
    deadline: Time,
    timer: Option<TimerId>,
}

impl Sleep {
    pub(crate) fn new(poller: PollerHandle, deadline: Time) -> Self {
        Self {
            poller,
            deadline,
            timer: None,
        }
    }

    pub fn deadline(&self) -> Time {
        self.deadline
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.poller.now() >= self.deadline {
            if let Some(id) = self.timer.take() {
                self.poller.cancel_timer(id);
            }
            return Poll::Ready(());
        }

        if self.timer.is_none() {
            let id = self.poller.add_timer(self.deadline, cx.waker().clone());
            self.timer = Some(id);
        }

        Poll::Pending
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        if let Some(id) = self.timer.take() {
            self.poller.cancel_timer(id);
        }
    }
}
