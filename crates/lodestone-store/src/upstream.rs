//! The seam between a store and the push source it mirrors.

use crate::error::SubscriptionError;
use std::fmt;
use std::rc::Rc;

/// Where an upstream delivers its events.
///
/// Holds only a weak link to the store, so a sink that outlives its store
/// drops events silently.
pub struct EventSink<E> {
    deliver: Rc<dyn Fn(E)>,
}

impl<E> EventSink<E> {
    pub fn new<F>(deliver: F) -> Self
    where
        F: Fn(E) + 'static,
    {
        Self {
            deliver: Rc::new(deliver),
        }
    }

    pub fn deliver(&self, event: E) {
        (self.deliver)(event);
    }
}

impl<E> Clone for EventSink<E> {
    fn clone(&self) -> Self {
        Self {
            deliver: Rc::clone(&self.deliver),
        }
    }
}

/// A live connection to an upstream source.
///
/// The teardown runs exactly once: on [`close`](UpstreamHandle::close) or on drop.
pub struct UpstreamHandle {
    teardown: Option<Box<dyn FnOnce()>>,
}

impl UpstreamHandle {
    pub fn new<F>(teardown: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self {
            teardown: Some(Box::new(teardown)),
        }
    }

    /// A handle with nothing to tear down.
    pub fn noop() -> Self {
        Self { teardown: None }
    }

    pub fn close(mut self) {
        self.run_teardown();
    }

    fn run_teardown(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

impl Drop for UpstreamHandle {
    fn drop(&mut self) {
        self.run_teardown();
    }
}

impl fmt::Debug for UpstreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamHandle")
            .field("open", &self.teardown.is_some())
            .finish()
    }
}

/// A push source a store can connect to on demand.
pub trait Upstream<E> {
    /// Human-readable name used in logs and errors.
    fn name(&self) -> &str;

    /// Start delivering events into `sink` until the returned handle is closed.
    fn connect(&self, sink: EventSink<E>) -> Result<UpstreamHandle, SubscriptionError>;
}

/// An upstream with no source behind it, for stores fed only through
/// [`EventStore::apply`](crate::EventStore::apply).
#[derive(Debug, Default, Clone, Copy)]
pub struct Detached;

impl<E> Upstream<E> for Detached {
    fn name(&self) -> &str {
        "detached"
    }

    fn connect(&self, _sink: EventSink<E>) -> Result<UpstreamHandle, SubscriptionError> {
        Ok(UpstreamHandle::noop())
    }
}
