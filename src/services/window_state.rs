//! Launcher window maximize state.
//!
//! The host has no event for this, so the store polls it while observed.

use lodestone_host::{EventPump, HostClient, HostError, PollingUpstream};
use lodestone_store::{EventStore, HandlerError, Reducer};
use log::debug;
use std::time::Duration;

pub type WindowEvent = Result<bool, HostError>;
pub type WindowStore = EventStore<WindowReducer>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WindowState {
    pub maximized: bool,
    /// The last probe failed; `maximized` is the last known value.
    pub probe_failed: bool,
}

pub struct WindowReducer;

impl Reducer for WindowReducer {
    type State = WindowState;
    type Event = WindowEvent;

    fn reduce(
        &self,
        prior: &WindowState,
        event: WindowEvent,
    ) -> Result<Option<WindowState>, HandlerError> {
        let next = match event {
            Ok(maximized) => WindowState {
                maximized,
                probe_failed: false,
            },
            Err(e) => {
                debug!("Window probe failed: {}", e);
                WindowState {
                    probe_failed: true,
                    ..*prior
                }
            }
        };
        Ok((next != *prior).then_some(next))
    }
}

pub fn new_store<F>(pump: EventPump, interval: Duration, probe: F) -> WindowStore
where
    F: Fn() -> Result<bool, HostError> + 'static,
{
    EventStore::new(
        WindowState::default(),
        WindowReducer,
        PollingUpstream::new("window-maximized", interval, pump, probe),
    )
}

#[derive(Clone)]
pub struct WindowService {
    store: WindowStore,
    client: HostClient,
}

impl WindowService {
    pub fn new(store: WindowStore, client: HostClient) -> Self {
        Self { store, client }
    }

    pub fn store(&self) -> &WindowStore {
        &self.store
    }

    /// Ask the host to (un)maximize; the store picks it up on the next poll.
    pub async fn set_maximized(&self, maximized: bool) -> Result<(), HostError> {
        self.client.set_maximized(maximized).await
    }

    pub async fn toggle(&self) -> Result<bool, HostError> {
        let target = !self.client.is_maximized().await?;
        self.set_maximized(target).await?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodestone_host::{CommandTransport, EventBus, LoopbackHost};
    use std::cell::Cell;
    use std::rc::Rc;
    use std::sync::Arc;

    #[test]
    fn test_reducer_keeps_last_value_on_probe_failure() {
        let maximized = WindowState {
            maximized: true,
            probe_failed: false,
        };

        let failed = WindowReducer
            .reduce(&maximized, Err(HostError::Unreachable))
            .unwrap()
            .unwrap();
        assert!(failed.maximized);
        assert!(failed.probe_failed);

        assert!(WindowReducer.reduce(&failed, Err(HostError::Unreachable)).unwrap().is_none());
        assert!(WindowReducer.reduce(&maximized, Ok(true)).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_toggle_is_seen_by_polling_store() {
        let host = Arc::new(LoopbackHost::new(Arc::new(EventBus::new())));
        let pump = EventPump::new();
        let service = WindowService::new(
            new_store(pump.clone(), Duration::ZERO, host.maximized_probe()),
            HostClient::new(Arc::clone(&host) as Arc<dyn CommandTransport>),
        );
        let hits = Rc::new(Cell::new(0));
        let hits_cb = Rc::clone(&hits);
        let _sub = service.store().subscribe(move || hits_cb.set(hits_cb.get() + 1));

        pump.drain();
        assert_eq!(hits.get(), 0);

        assert!(service.toggle().await.unwrap());
        pump.drain();
        assert!(service.store().snapshot().maximized);
        assert_eq!(hits.get(), 1);

        host.shutdown();
        pump.drain();
        let state = *service.store().snapshot();
        assert!(state.maximized && state.probe_failed);
    }

    #[test]
    fn test_polling_stops_when_unobserved() {
        let pump = EventPump::new();
        let polls = Rc::new(Cell::new(0));
        let polls_probe = Rc::clone(&polls);
        let store = new_store(pump.clone(), Duration::ZERO, move || {
            polls_probe.set(polls_probe.get() + 1);
            Ok(false)
        });

        pump.drain();
        assert_eq!(polls.get(), 0);

        let mut sub = store.subscribe(|| {});
        pump.drain();
        assert_eq!(polls.get(), 1);

        sub.unsubscribe();
        pump.drain();
        assert_eq!(polls.get(), 1);
    }
}
