//! UI-thread event pump.
//!
//! Host events arrive on broadcast channels from any thread, but stores are
//! single-threaded. The pump is drained on a fixed tick from the UI loop and
//! hands each pending item to its source's delivery closure. No borrow is
//! held while delivering, so deliveries may attach or detach sources.

use crate::error::HostError;
use log::{debug, info};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::TryRecvError;

pub type SourceId = u64;

type ChannelDelivery = Rc<dyn Fn(Result<Value, HostError>)>;
type ProbeRun = Rc<dyn Fn()>;

enum Source {
    Channel {
        rx: Receiver<Value>,
        deliver: ChannelDelivery,
        closed: bool,
    },
    Probe {
        interval: Duration,
        last_run: Option<Instant>,
        run: ProbeRun,
    },
}

enum Pending {
    Item(ChannelDelivery, Result<Value, HostError>),
    Probe(ProbeRun),
}

#[derive(Default)]
struct PumpState {
    next_id: SourceId,
    sources: BTreeMap<SourceId, Source>,
    shut_down: bool,
}

/// Shared handle to the pump. Clones drive the same set of sources.
#[derive(Clone, Default)]
pub struct EventPump {
    state: Rc<RefCell<PumpState>>,
}

impl EventPump {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward everything received on `rx` to `deliver`.
    pub fn attach_channel<F>(&self, rx: Receiver<Value>, deliver: F) -> Result<SourceId, HostError>
    where
        F: Fn(Result<Value, HostError>) + 'static,
    {
        self.insert(Source::Channel {
            rx,
            deliver: Rc::new(deliver),
            closed: false,
        })
    }

    /// Call `run` on the first drain and then whenever `interval` has passed.
    pub fn attach_probe<F>(&self, interval: Duration, run: F) -> Result<SourceId, HostError>
    where
        F: Fn() + 'static,
    {
        self.insert(Source::Probe {
            interval,
            last_run: None,
            run: Rc::new(run),
        })
    }

    fn insert(&self, source: Source) -> Result<SourceId, HostError> {
        let mut state = self.state.borrow_mut();
        if state.shut_down {
            return Err(HostError::Unreachable);
        }
        state.next_id += 1;
        let id = state.next_id;
        state.sources.insert(id, source);
        debug!("Pump source {} attached ({} active)", id, state.sources.len());
        Ok(id)
    }

    pub fn detach(&self, id: SourceId) -> bool {
        let removed = self.state.borrow_mut().sources.remove(&id).is_some();
        if removed {
            debug!("Pump source {} detached", id);
        }
        removed
    }

    pub fn is_attached(&self, id: SourceId) -> bool {
        self.state.borrow().sources.contains_key(&id)
    }

    pub fn source_count(&self) -> usize {
        self.state.borrow().sources.len()
    }

    /// Deliver everything pending. Returns the number of deliveries made.
    pub fn drain(&self) -> usize {
        let batch = self.collect(Instant::now());
        let mut delivered = 0;

        for (id, pending) in batch {
            // Detached by an earlier delivery in this batch.
            if !self.is_attached(id) {
                continue;
            }
            match pending {
                Pending::Item(deliver, item) => deliver(item),
                Pending::Probe(run) => run(),
            }
            delivered += 1;
        }

        self.state
            .borrow_mut()
            .sources
            .retain(|_, source| !matches!(source, Source::Channel { closed: true, .. }));

        delivered
    }

    fn collect(&self, now: Instant) -> Vec<(SourceId, Pending)> {
        let mut state = self.state.borrow_mut();
        let mut batch = Vec::new();

        for (id, source) in state.sources.iter_mut() {
            match source {
                Source::Channel {
                    rx,
                    deliver,
                    closed,
                } => {
                    while !*closed {
                        let item = match rx.try_recv() {
                            Ok(value) => Ok(value),
                            Err(TryRecvError::Empty) => break,
                            Err(TryRecvError::Lagged(missed)) => Err(HostError::Lagged(missed)),
                            Err(TryRecvError::Closed) => {
                                *closed = true;
                                Err(HostError::Disconnected)
                            }
                        };
                        batch.push((*id, Pending::Item(Rc::clone(deliver), item)));
                    }
                }
                Source::Probe {
                    interval,
                    last_run,
                    run,
                } => {
                    let due = last_run.is_none_or(|at| now.duration_since(at) >= *interval);
                    if due {
                        *last_run = Some(now);
                        batch.push((*id, Pending::Probe(Rc::clone(run))));
                    }
                }
            }
        }

        batch
    }

    /// Detach every source and refuse new ones.
    pub fn shutdown(&self) {
        let mut state = self.state.borrow_mut();
        state.shut_down = true;
        let dropped = std::mem::take(&mut state.sources);
        drop(state);
        info!("Event pump shut down ({} sources detached)", dropped.len());
    }
}
