//! A one-shot gate.

use std::sync::{Condvar, Mutex};

/// Gate
///
/// A gate is created closed; any number of threads may wait for it to be opened, and once opened it remains open.
///
/// #   Example
///
/// ```
/// use std::thread;
/// use segpool_test::Gate;
///
/// let gate = Gate::default();
///
/// thread::scope(|scope| {
///     scope.spawn(|| gate.wait());
///
///     gate.open();
/// });
///
/// assert!(gate.is_open());
/// ```
#[derive(Debug, Default)]
pub struct Gate {
    open: Mutex<bool>,
    condition: Condvar,
}

impl Gate {
    /// Creates a closed gate.
    pub fn new() -> Self { Self::default() }

    /// Opens the gate, releasing all waiting threads.
    pub fn open(&self) {
        let mut open = self.open.lock().unwrap();
        *open = true;

        self.condition.notify_all();
    }

    /// Returns whether the gate is open.
    pub fn is_open(&self) -> bool { *self.open.lock().unwrap() }

    /// Blocks until the gate is open.
    pub fn wait(&self) {
        let open = self.open.lock().unwrap();

        let _open = self.condition.wait_while(open, |open| !*open).unwrap();
    }
}

// mod tests
