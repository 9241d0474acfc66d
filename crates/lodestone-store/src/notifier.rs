//! Change fan-out for a single store.
//!
//! The notifier only says "something changed". Consumers re-read the
//! snapshot themselves, so there is no payload to clone per callback.

use log::{debug, error};
use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

/// A change callback. Identity is the address of the `Rc` allocation.
pub type Callback = Rc<dyn Fn()>;

/// Set of change callbacks with per-callback failure isolation.
#[derive(Default)]
pub struct Notifier {
    callbacks: RefCell<Vec<Callback>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a callback. Registering the same `Rc` twice keeps a single entry.
    ///
    /// Returns `true` if the callback was not registered before.
    pub fn register(&self, callback: Callback) -> bool {
        let mut callbacks = self.callbacks.borrow_mut();
        if callbacks.iter().any(|c| same_callback(c, &callback)) {
            return false;
        }
        callbacks.push(callback);
        true
    }

    /// Remove a callback. Returns `false` if it was not registered.
    pub fn unregister(&self, callback: &Callback) -> bool {
        let mut callbacks = self.callbacks.borrow_mut();
        let before = callbacks.len();
        callbacks.retain(|c| !same_callback(c, callback));
        callbacks.len() != before
    }

    /// Remove every callback. Returns how many were registered.
    pub fn clear(&self) -> usize {
        let removed = std::mem::take(&mut *self.callbacks.borrow_mut());
        removed.len()
    }

    pub fn contains(&self, callback: &Callback) -> bool {
        self.callbacks
            .borrow()
            .iter()
            .any(|c| same_callback(c, callback))
    }

    pub fn len(&self) -> usize {
        self.callbacks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.borrow().is_empty()
    }

    /// Invoke every registered callback once.
    ///
    /// The set is copied before the first call so callbacks may register,
    /// unregister or read the owning store. A callback removed earlier in the
    /// same cycle is skipped. A panicking callback is logged and the rest
    /// still run. Returns the number of callbacks that panicked.
    pub fn publish(&self) -> usize {
        let pending: Vec<Callback> = self.callbacks.borrow().clone();
        let mut failed = 0;

        for callback in pending {
            if !self.contains(&callback) {
                debug!("Skipping callback unregistered during publish");
                continue;
            }

            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback())) {
                failed += 1;
                error!("Change callback panicked: {}", panic_message(&payload));
            }
        }

        failed
    }
}

fn same_callback(a: &Callback, b: &Callback) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}

pub(crate) fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
