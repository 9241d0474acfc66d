//! `Upstream` adapters over the native host.
//!
//! Stores built on these see `Result<T, HostError>`: channel trouble and
//! undecodable payloads arrive as events, never as panics.

use crate::bus::EventBus;
use crate::error::HostError;
use crate::pump::EventPump;
use lodestone_store::{EventSink, SubscriptionError, Upstream, UpstreamHandle};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

/// Mirrors one named host event, decoded into `P`.
pub struct HostEventUpstream<P> {
    event: String,
    bus: Arc<EventBus>,
    pump: EventPump,
    _payload: PhantomData<fn() -> P>,
}

impl<P> HostEventUpstream<P> {
    pub fn new(event: impl Into<String>, bus: Arc<EventBus>, pump: EventPump) -> Self {
        Self {
            event: event.into(),
            bus,
            pump,
            _payload: PhantomData,
        }
    }
}

impl<P> Upstream<Result<P, HostError>> for HostEventUpstream<P>
where
    P: DeserializeOwned + 'static,
{
    fn name(&self) -> &str {
        &self.event
    }

    fn connect(
        &self,
        sink: EventSink<Result<P, HostError>>,
    ) -> Result<UpstreamHandle, SubscriptionError> {
        let rx = self
            .bus
            .listen(&self.event)
            .map_err(|e| SubscriptionError::new(self.event.as_str(), e.to_string()))?;

        let event = self.event.clone();
        let id = self
            .pump
            .attach_channel(rx, move |item| {
                let decoded = item.and_then(|value| {
                    serde_json::from_value::<P>(value).map_err(|source| HostError::Decode {
                        what: event.clone(),
                        source,
                    })
                });
                sink.deliver(decoded);
            })
            .map_err(|e| SubscriptionError::new(self.event.as_str(), e.to_string()))?;

        let pump = self.pump.clone();
        Ok(UpstreamHandle::new(move || {
            pump.detach(id);
        }))
    }
}

/// Function polled by a [`PollingUpstream`].
pub type Probe<T> = Rc<dyn Fn() -> Result<T, HostError>>;

/// Polls a host query on a fixed interval while observed.
pub struct PollingUpstream<T> {
    name: String,
    interval: Duration,
    probe: Probe<T>,
    pump: EventPump,
}

impl<T> PollingUpstream<T> {
    pub fn new<F>(name: impl Into<String>, interval: Duration, pump: EventPump, probe: F) -> Self
    where
        F: Fn() -> Result<T, HostError> + 'static,
    {
        Self {
            name: name.into(),
            interval,
            probe: Rc::new(probe),
            pump,
        }
    }
}

impl<T: 'static> Upstream<Result<T, HostError>> for PollingUpstream<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(
        &self,
        sink: EventSink<Result<T, HostError>>,
    ) -> Result<UpstreamHandle, SubscriptionError> {
        let probe = Rc::clone(&self.probe);
        let id = self
            .pump
            .attach_probe(self.interval, move || sink.deliver(probe()))
            .map_err(|e| SubscriptionError::new(self.name.as_str(), e.to_string()))?;

        let pump = self.pump.clone();
        Ok(UpstreamHandle::new(move || {
            pump.detach(id);
        }))
    }
}
