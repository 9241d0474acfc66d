//! The generic observable store.
//!
//! An [`EventStore`] mirrors an upstream push source into a snapshot that
//! can be read synchronously at any time. The upstream is only connected
//! while at least one [`Subscription`] is alive.

use crate::error::HandlerError;
use crate::notifier::{Callback, Notifier, panic_message};
use crate::upstream::{EventSink, Upstream, UpstreamHandle};
use log::{debug, error, info, warn};
use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

/// Pure state transition for one store.
pub trait Reducer {
    type State: PartialEq;
    type Event;

    /// Compute the state after `event`.
    ///
    /// `Ok(None)` means the event changes nothing. A returned state equal to
    /// `prior` is treated the same way. `Err` drops the event.
    fn reduce(
        &self,
        prior: &Self::State,
        event: Self::Event,
    ) -> Result<Option<Self::State>, HandlerError>;
}

/// Adapts a closure into a [`Reducer`].
pub struct FnReducer<S, E, F> {
    reduce: F,
    _marker: PhantomData<fn(&S, E)>,
}

impl<S, E, F> FnReducer<S, E, F>
where
    F: Fn(&S, E) -> Result<Option<S>, HandlerError>,
{
    pub fn new(reduce: F) -> Self {
        Self {
            reduce,
            _marker: PhantomData,
        }
    }
}

impl<S, E, F> Reducer for FnReducer<S, E, F>
where
    S: PartialEq,
    F: Fn(&S, E) -> Result<Option<S>, HandlerError>,
{
    type State = S;
    type Event = E;

    fn reduce(&self, prior: &S, event: E) -> Result<Option<S>, HandlerError> {
        (self.reduce)(prior, event)
    }
}

struct Inner<R: Reducer> {
    reducer: R,
    state: RefCell<Rc<R::State>>,
    notifier: Notifier,
    upstream: Box<dyn Upstream<R::Event>>,
    handle: RefCell<Option<UpstreamHandle>>,
    closed: Cell<bool>,
}

/// Shared handle to a store. Cloning is cheap and every clone sees the same state.
pub struct EventStore<R: Reducer> {
    inner: Rc<Inner<R>>,
}

impl<R: Reducer> Clone for EventStore<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<R> EventStore<R>
where
    R: Reducer + 'static,
    R::State: 'static,
    R::Event: 'static,
{
    pub fn new<U>(initial: R::State, reducer: R, upstream: U) -> Self
    where
        U: Upstream<R::Event> + 'static,
    {
        Self {
            inner: Rc::new(Inner {
                reducer,
                state: RefCell::new(Rc::new(initial)),
                notifier: Notifier::new(),
                upstream: Box::new(upstream),
                handle: RefCell::new(None),
                closed: Cell::new(false),
            }),
        }
    }

    /// Current state. Never blocks and has no side effects.
    ///
    /// Every applied update installs a new `Rc`, so `Rc::ptr_eq` on two
    /// snapshots tells whether anything changed in between.
    pub fn snapshot(&self) -> Rc<R::State> {
        Rc::clone(&self.inner.state.borrow())
    }

    /// Call `callback` after every state change until the returned
    /// [`Subscription`] is unsubscribed or dropped.
    ///
    /// The first subscriber connects the upstream. If connecting fails the
    /// store keeps its last snapshot and tries again on the next subscribe.
    /// A closed store hands out an inactive subscription.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn() + 'static,
    {
        if self.inner.closed.get() {
            debug!("[{}] subscribe on closed store ignored", self.inner.upstream.name());
            return Subscription { release: None };
        }

        let callback: Callback = Rc::new(callback);
        self.inner.notifier.register(Rc::clone(&callback));
        debug!(
            "[{}] subscriber added ({} total)",
            self.inner.upstream.name(),
            self.inner.notifier.len()
        );

        Inner::ensure_connected(&self.inner);

        let store: Weak<Inner<R>> = Rc::downgrade(&self.inner);
        Subscription {
            release: Some(Box::new(move || {
                if let Some(inner) = store.upgrade() {
                    Inner::release(&inner, &callback);
                }
            })),
        }
    }

    /// Run `event` through the reducer as if the upstream had delivered it.
    pub fn apply(&self, event: R::Event) {
        Inner::dispatch(&self.inner, event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.notifier.len()
    }

    /// Whether an upstream connection is currently held.
    pub fn is_connected(&self) -> bool {
        self.inner.handle.borrow().is_some()
    }

    pub fn source_name(&self) -> &str {
        self.inner.upstream.name()
    }

    /// Drop every subscriber and disconnect the upstream for good.
    ///
    /// Callbacks that captured a clone of this store are released too, so the
    /// store is freed once the remaining outside handles go away. Later
    /// subscribes are inactive; `snapshot` and `apply` keep working.
    pub fn close(&self) {
        if self.inner.closed.replace(true) {
            return;
        }
        let dropped = self.inner.notifier.clear();
        Inner::disconnect(&self.inner);
        info!(
            "[{}] store closed ({} subscribers dropped)",
            self.inner.upstream.name(),
            dropped
        );
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.get()
    }
}

impl<R> Inner<R>
where
    R: Reducer + 'static,
    R::State: 'static,
    R::Event: 'static,
{
    fn ensure_connected(inner: &Rc<Self>) {
        if inner.closed.get() || inner.notifier.is_empty() || inner.handle.borrow().is_some() {
            return;
        }

        let store = Rc::downgrade(inner);
        let sink = EventSink::new(move |event| {
            if let Some(inner) = store.upgrade() {
                Inner::dispatch(&inner, event);
            }
        });

        match inner.upstream.connect(sink) {
            Ok(handle) => {
                info!("[{}] upstream connected", inner.upstream.name());
                *inner.handle.borrow_mut() = Some(handle);
            }
            Err(e) => {
                warn!("[{}] {}; keeping last snapshot", inner.upstream.name(), e);
                return;
            }
        }

        // A callback fired during connect may already have dropped the last subscriber.
        if inner.notifier.is_empty() {
            Self::disconnect(inner);
        }
    }

    fn release(inner: &Rc<Self>, callback: &Callback) {
        if !inner.notifier.unregister(callback) {
            return;
        }
        debug!(
            "[{}] subscriber removed ({} left)",
            inner.upstream.name(),
            inner.notifier.len()
        );

        if inner.notifier.is_empty() {
            Self::disconnect(inner);
        }
    }

    fn disconnect(inner: &Rc<Self>) {
        let handle = inner.handle.borrow_mut().take();
        if let Some(handle) = handle {
            handle.close();
            info!("[{}] upstream disconnected", inner.upstream.name());
        }
    }

    fn dispatch(inner: &Rc<Self>, event: R::Event) {
        let prior = Rc::clone(&inner.state.borrow());

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            inner.reducer.reduce(&prior, event)
        }));

        let next = match outcome {
            Ok(Ok(Some(next))) => next,
            Ok(Ok(None)) => return,
            Ok(Err(e)) => {
                warn!("[{}] event dropped: {}", inner.upstream.name(), e);
                return;
            }
            Err(payload) => {
                error!(
                    "[{}] reducer panicked, event dropped: {}",
                    inner.upstream.name(),
                    panic_message(&payload)
                );
                return;
            }
        };

        if next == *prior {
            return;
        }

        *inner.state.borrow_mut() = Rc::new(next);
        inner.notifier.publish();
    }
}

/// Keeps a store callback registered.
///
/// Dropping the subscription unsubscribes it.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Stop receiving notifications. Calling this more than once does nothing.
    pub fn unsubscribe(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }

    pub fn is_active(&self) -> bool {
        self.release.is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SubscriptionError;
    use std::cell::Cell;
    use std::collections::BTreeSet;

    #[derive(Debug, Clone, PartialEq)]
    struct RunEvent {
        profile: &'static str,
        state: bool,
    }

    #[derive(Debug, Default, PartialEq)]
    struct Running {
        running: BTreeSet<&'static str>,
    }

    fn run_reducer() -> impl Reducer<State = Running, Event = RunEvent> {
        FnReducer::new(|prior: &Running, event: RunEvent| {
            let mut running = prior.running.clone();
            let changed = if event.state {
                running.insert(event.profile)
            } else {
                running.remove(event.profile)
            };
            Ok(changed.then_some(Running { running }))
        })
    }

    /// Manually driven upstream that counts connects and teardowns.
    #[derive(Clone, Default)]
    struct FakeUpstream {
        sink: Rc<RefCell<Option<EventSink<RunEvent>>>>,
        connects: Rc<Cell<usize>>,
        closes: Rc<Cell<usize>>,
        failing: Rc<Cell<bool>>,
    }

    impl FakeUpstream {
        fn emit(&self, profile: &'static str, state: bool) {
            let sink = self.sink.borrow().clone();
            if let Some(sink) = sink {
                sink.deliver(RunEvent { profile, state });
            }
        }
    }

    impl Upstream<RunEvent> for FakeUpstream {
        fn name(&self) -> &str {
            "fake"
        }

        fn connect(
            &self,
            sink: EventSink<RunEvent>,
        ) -> Result<UpstreamHandle, SubscriptionError> {
            if self.failing.get() {
                return Err(SubscriptionError::new("fake", "host unreachable"));
            }
            self.connects.set(self.connects.get() + 1);
            *self.sink.borrow_mut() = Some(sink);

            let slot = Rc::clone(&self.sink);
            let closes = Rc::clone(&self.closes);
            Ok(UpstreamHandle::new(move || {
                slot.borrow_mut().take();
                closes.set(closes.get() + 1);
            }))
        }
    }

    fn counting_callback() -> (Rc<Cell<usize>>, impl Fn() + 'static) {
        let hits = Rc::new(Cell::new(0));
        let hits_cb = Rc::clone(&hits);
        (hits, move || hits_cb.set(hits_cb.get() + 1))
    }

    fn new_store(
        upstream: &FakeUpstream,
    ) -> EventStore<impl Reducer<State = Running, Event = RunEvent> + 'static> {
        EventStore::new(Running::default(), run_reducer(), upstream.clone())
    }

    #[test]
    fn test_snapshot_before_any_subscription_is_initial() {
        let upstream = FakeUpstream::default();
        let store = new_store(&upstream);

        assert!(store.snapshot().running.is_empty());
        assert!(!store.is_connected());
        assert_eq!(upstream.connects.get(), 0);
    }

    #[test]
    fn test_first_subscriber_connects_once() {
        let upstream = FakeUpstream::default();
        let store = new_store(&upstream);

        let _a = store.subscribe(|| {});
        let _b = store.subscribe(|| {});
        let _c = store.subscribe(|| {});

        assert_eq!(upstream.connects.get(), 1);
        assert_eq!(store.subscriber_count(), 3);
        assert!(store.is_connected());
    }

    #[test]
    fn test_last_unsubscribe_tears_down_once() {
        let upstream = FakeUpstream::default();
        let store = new_store(&upstream);

        let mut a = store.subscribe(|| {});
        let mut b = store.subscribe(|| {});

        a.unsubscribe();
        assert_eq!(upstream.closes.get(), 0);
        assert!(store.is_connected());

        b.unsubscribe();
        b.unsubscribe();
        a.unsubscribe();
        drop(a);
        drop(b);

        assert_eq!(upstream.closes.get(), 1);
        assert!(!store.is_connected());
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn test_resubscribe_reconnects() {
        let upstream = FakeUpstream::default();
        let store = new_store(&upstream);

        drop(store.subscribe(|| {}));
        drop(store.subscribe(|| {}));
        let _live = store.subscribe(|| {});

        assert_eq!(upstream.connects.get(), 3);
        assert_eq!(upstream.closes.get(), 2);
    }

    #[test]
    fn test_run_state_scenario() {
        let upstream = FakeUpstream::default();
        let store = new_store(&upstream);
        let (hits, callback) = counting_callback();
        let _sub = store.subscribe(callback);

        upstream.emit("A", true);
        assert_eq!(hits.get(), 1);
        assert!(store.snapshot().running.contains("A"));

        let before = store.snapshot();
        upstream.emit("A", true);
        assert_eq!(hits.get(), 1);
        assert!(Rc::ptr_eq(&before, &store.snapshot()));

        upstream.emit("A", false);
        assert_eq!(hits.get(), 2);
        assert!(store.snapshot().running.is_empty());
    }

    #[test]
    fn test_equal_result_does_not_notify() {
        // Always returns a fresh but equal state.
        let reducer = FnReducer::new(|prior: &u32, _event: ()| Ok(Some(*prior)));
        let store = EventStore::new(7u32, reducer, crate::Detached);
        let (hits, callback) = counting_callback();
        let _sub = store.subscribe(callback);

        let before = store.snapshot();
        store.apply(());

        assert_eq!(hits.get(), 0);
        assert!(Rc::ptr_eq(&before, &store.snapshot()));
    }

    #[test]
    fn test_snapshot_is_pure_reduction_of_events() {
        let upstream = FakeUpstream::default();
        let store = new_store(&upstream);
        let _sub = store.subscribe(|| {});

        let events = [("A", true), ("B", true), ("A", false), ("C", true), ("B", true)];
        let mut expected = Running::default();
        let reducer = run_reducer();
        for (profile, state) in events {
            upstream.emit(profile, state);
            if let Ok(Some(next)) = reducer.reduce(&expected, RunEvent { profile, state }) {
                expected = next;
            }
        }

        assert_eq!(*store.snapshot(), expected);
        assert_eq!(
            store.snapshot().running.iter().copied().collect::<Vec<_>>(),
            vec!["B", "C"]
        );
    }

    #[test]
    fn test_remaining_consumer_keeps_receiving() {
        let upstream = FakeUpstream::default();
        let store = new_store(&upstream);
        let (first_hits, first) = counting_callback();
        let (second_hits, second) = counting_callback();

        let mut first_sub = store.subscribe(first);
        let _second_sub = store.subscribe(second);
        first_sub.unsubscribe();

        assert!(store.is_connected());
        assert_eq!(store.subscriber_count(), 1);

        upstream.emit("A", true);
        assert_eq!(first_hits.get(), 0);
        assert_eq!(second_hits.get(), 1);
    }

    #[test]
    fn test_failing_reducer_leaves_state_untouched() {
        let reducer = FnReducer::new(|prior: &i32, delta: i32| {
            if delta < 0 {
                return Err(HandlerError::new("negative delta"));
            }
            if delta == 13 {
                panic!("unlucky");
            }
            Ok(Some(prior + delta))
        });
        let store = EventStore::new(0, reducer, crate::Detached);
        let (hits, callback) = counting_callback();
        let _sub = store.subscribe(callback);

        store.apply(2);
        store.apply(-5);
        store.apply(13);
        store.apply(3);

        assert_eq!(*store.snapshot(), 5);
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn test_panicking_callback_isolated_from_upstream() {
        let upstream = FakeUpstream::default();
        let store = new_store(&upstream);
        let (hits, callback) = counting_callback();

        let _bad = store.subscribe(|| panic!("render failed"));
        let _good = store.subscribe(callback);

        upstream.emit("A", true);
        upstream.emit("B", true);

        assert_eq!(hits.get(), 2);
        assert_eq!(store.snapshot().running.len(), 2);
    }

    #[test]
    fn test_connect_failure_retries_on_next_subscribe() {
        let upstream = FakeUpstream::default();
        upstream.failing.set(true);
        let store = new_store(&upstream);

        let _first = store.subscribe(|| {});
        assert!(!store.is_connected());
        assert_eq!(store.subscriber_count(), 1);

        upstream.failing.set(false);
        let _second = store.subscribe(|| {});
        assert!(store.is_connected());
        assert_eq!(upstream.connects.get(), 1);
    }

    #[test]
    fn test_unsubscribed_callback_never_fires() {
        let upstream = FakeUpstream::default();
        let store = new_store(&upstream);
        let (hits, callback) = counting_callback();

        let _keep_alive = store.subscribe(|| {});
        let mut sub = store.subscribe(callback);
        upstream.emit("A", true);
        sub.unsubscribe();
        upstream.emit("B", true);

        assert_eq!(hits.get(), 1);
        assert!(!sub.is_active());
    }

    #[test]
    fn test_callback_reads_latest_snapshot() {
        let upstream = FakeUpstream::default();
        let store = new_store(&upstream);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let store_cb = store.clone();
        let seen_cb = Rc::clone(&seen);
        let _sub = store.subscribe(move || {
            seen_cb.borrow_mut().push(store_cb.snapshot().running.len());
        });

        upstream.emit("A", true);
        upstream.emit("B", true);
        upstream.emit("A", false);

        assert_eq!(*seen.borrow(), vec![1, 2, 1]);
    }

    #[test]
    fn test_callback_may_apply_and_subscribe_during_publish() {
        let upstream = FakeUpstream::default();
        let store = new_store(&upstream);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let (late_hits, late) = counting_callback();
        let late = Rc::new(RefCell::new(Some(late)));
        let late_subs = Rc::new(RefCell::new(Vec::new()));

        let store_cb = store.clone();
        let seen_cb = Rc::clone(&seen);
        let late_cb = Rc::clone(&late);
        let late_subs_cb = Rc::clone(&late_subs);
        let _chain = store.subscribe(move || {
            let snapshot = store_cb.snapshot();
            seen_cb.borrow_mut().push(snapshot.running.len());
            if snapshot.running.contains("A") && !snapshot.running.contains("B") {
                store_cb.apply(RunEvent {
                    profile: "B",
                    state: true,
                });
            }
            if let Some(callback) = late_cb.borrow_mut().take() {
                late_subs_cb.borrow_mut().push(store_cb.subscribe(callback));
            }
        });

        upstream.emit("A", true);
        assert_eq!(*seen.borrow(), vec![1, 2]);
        assert_eq!(store.snapshot().running.len(), 2);
        assert_eq!(store.subscriber_count(), 2);
        // Added mid-cycle, so first called on the next change.
        assert_eq!(late_hits.get(), 0);
        assert_eq!(upstream.connects.get(), 1);

        upstream.emit("C", true);
        assert_eq!(*seen.borrow(), vec![1, 2, 3]);
        assert_eq!(late_hits.get(), 1);

        store.close();
    }

    #[test]
    fn test_close_releases_callbacks_holding_the_store() {
        let upstream = FakeUpstream::default();
        let store = new_store(&upstream);
        let inner = Rc::downgrade(&store.inner);

        let store_cb = store.clone();
        let mut sub = store.subscribe(move || {
            let _ = store_cb.snapshot();
        });
        assert!(store.is_connected());

        store.close();
        store.close();
        assert!(store.is_closed());
        assert!(!store.is_connected());
        assert_eq!(store.subscriber_count(), 0);
        assert_eq!(upstream.closes.get(), 1);

        let late = store.subscribe(|| {});
        assert!(!late.is_active());
        assert_eq!(upstream.connects.get(), 1);

        drop(late);
        drop(store);
        assert!(inner.upgrade().is_none());
        sub.unsubscribe();
    }

    #[test]
    fn test_dropping_store_closes_upstream() {
        let upstream = FakeUpstream::default();
        let store = new_store(&upstream);
        let mut sub = store.subscribe(|| {});

        drop(store);
        assert_eq!(upstream.closes.get(), 1);

        // Late events and late unsubscribes are harmless.
        upstream.emit("A", true);
        sub.unsubscribe();
    }
}
