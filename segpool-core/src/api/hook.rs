//! Instrumentation of `FreeList::pop`.
//!
//! A race between two `pop`s, or a `pop` and a `push`, is nigh impossible to reproduce at will: the window between
//! reading the head and exchanging it is a handful of instructions wide. A `PopHook` is invoked in the middle of this
//! window, allowing tests to suspend the popping thread and script the interleaving of the other threads.

use core::ptr::NonNull;

/// Hook invoked by `FreeList::pop`, between computing the new head and attempting to install it.
pub trait PopHook {
    /// Invoked once per attempt, after `head` was loaded and its successor `next` decoded from its link.
    #[inline(always)]
    fn before_exchange(&self, head: NonNull<u8>, next: Option<NonNull<u8>>) {
        let _ = (head, next);
    }
}

/// The hook of choice outside of tests: does nothing, costs nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoHook;

impl PopHook for NoHook {}
