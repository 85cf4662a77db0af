//! Single-threaded task wakers.
//!
//! The standard [`Wake`] trait only turns `Arc<W>` into a [`Waker`], and
//! demands `Send + Sync` of the target. This runtime has neither: tasks
//! live on one thread and are counted with [`Rc`]. [`LocalWake`] is the
//! thread-local counterpart, lowered by [`local_waker`] into a raw vtable
//! whose entries manipulate the target's `Rc` strong count directly.
//!
//! Sound only because wakers never leave the loop thread; nothing here is
//! exported from the crate.
//!
//! [`Wake`]: std::task::Wake

use std::mem::ManuallyDrop;
use std::rc::Rc;
use std::task::{RawWaker, RawWakerVTable, Waker};

/// Thread-local counterpart of [`std::task::Wake`].
pub(crate) trait LocalWake {
    fn wake(self: Rc<Self>);
}

/// Builds a [`Waker`] holding one strong count on `target`.
///
/// Cloning the waker bumps the count, waking consumes it, dropping releases
/// it; `W::wake` runs on the loop thread like everything else.
pub(crate) fn local_waker<W: LocalWake>(target: Rc<W>) -> Waker {
    let raw = RawWaker::new(Rc::into_raw(target).cast(), vtable::<W>());

    unsafe { Waker::from_raw(raw) }
}

// Promoted to 'static per instantiation; fn pointers of generic functions
// are constants.
fn vtable<W: LocalWake>() -> &'static RawWakerVTable {
    &RawWakerVTable::new(
        clone_raw::<W>,
        wake_raw::<W>,
        wake_by_ref_raw::<W>,
        drop_raw::<W>,
    )
}

unsafe fn clone_raw<W: LocalWake>(ptr: *const ()) -> RawWaker {
    unsafe { Rc::<W>::increment_strong_count(ptr.cast()) };

    RawWaker::new(ptr, vtable::<W>())
}

unsafe fn wake_raw<W: LocalWake>(ptr: *const ()) {
    let target = unsafe { Rc::<W>::from_raw(ptr.cast()) };
    target.wake();
}

unsafe fn wake_by_ref_raw<W: LocalWake>(ptr: *const ()) {
    let target = unsafe { ManuallyDrop::new(Rc::<W>::from_raw(ptr.cast())) };
    W::wake(Rc::clone(&target));
}

unsafe fn drop_raw<W: LocalWake>(ptr: *const ()) {
    drop(unsafe { Rc::<W>::from_raw(ptr.cast()) });
}
