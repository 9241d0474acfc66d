//! Game process run state per profile.
//!
//! Mirrors the host's `profile-run-state` events into the set of profiles
//! that currently have a running game. Launch and stop go through host
//! commands; their failures are returned to the caller.

use lodestone_host::payload::RUN_STATE_EVENT;
use lodestone_host::{
    EventBus, EventPump, HostClient, HostError, HostEventUpstream, RunStatePayload,
};
use lodestone_store::{EventStore, HandlerError, Reducer};
use log::info;
use std::collections::BTreeSet;
use std::sync::Arc;

pub type RunStateEvent = Result<RunStatePayload, HostError>;
pub type ProcessStore = EventStore<RunStateReducer>;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunningProfiles {
    pub running: BTreeSet<String>,
    /// Last channel or decode problem; cleared by the next good event.
    pub last_error: Option<String>,
}

impl RunningProfiles {
    pub fn is_running(&self, profile: &str) -> bool {
        self.running.contains(profile)
    }
}

pub struct RunStateReducer;

impl Reducer for RunStateReducer {
    type State = RunningProfiles;
    type Event = RunStateEvent;

    fn reduce(
        &self,
        prior: &RunningProfiles,
        event: RunStateEvent,
    ) -> Result<Option<RunningProfiles>, HandlerError> {
        let payload = match event {
            Ok(payload) => payload,
            Err(e) => {
                let message = e.to_string();
                if prior.last_error.as_deref() == Some(message.as_str()) {
                    return Ok(None);
                }
                return Ok(Some(RunningProfiles {
                    running: prior.running.clone(),
                    last_error: Some(message),
                }));
            }
        };

        if payload.profile.is_empty() {
            return Err(HandlerError::new("run state event without a profile"));
        }

        // A duplicate start or stop is a no-op unless it also clears an error.
        let already = prior.is_running(&payload.profile) == payload.state;
        if already && prior.last_error.is_none() {
            return Ok(None);
        }

        let mut running = prior.running.clone();
        if payload.state {
            running.insert(payload.profile);
        } else {
            running.remove(&payload.profile);
        }

        Ok(Some(RunningProfiles {
            running,
            last_error: None,
        }))
    }
}

pub fn new_store(bus: Arc<EventBus>, pump: EventPump) -> ProcessStore {
    EventStore::new(
        RunningProfiles::default(),
        RunStateReducer,
        HostEventUpstream::new(RUN_STATE_EVENT, bus, pump),
    )
}

/// Run state store plus the commands that change it.
#[derive(Clone)]
pub struct ProcessService {
    store: ProcessStore,
    client: HostClient,
}

impl ProcessService {
    pub fn new(store: ProcessStore, client: HostClient) -> Self {
        Self { store, client }
    }

    pub fn store(&self) -> &ProcessStore {
        &self.store
    }

    pub async fn launch(&self, profile: &str) -> Result<(), HostError> {
        info!("Launching {}", profile);
        self.client.launch(profile).await
    }

    pub async fn stop(&self, profile: &str) -> Result<(), HostError> {
        info!("Stopping {}", profile);
        self.client.stop(profile).await
    }

    /// Ask the host directly and fold the answer into the store.
    pub async fn refresh(&self, profile: &str) -> Result<bool, HostError> {
        let running = self.client.is_running(profile).await?;
        self.store.apply(Ok(RunStatePayload {
            profile: profile.to_string(),
            state: running,
        }));
        Ok(running)
    }
}
