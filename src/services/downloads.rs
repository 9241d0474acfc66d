//! Download queue progress.
//!
//! The host does the downloading and reports queue activity on
//! `download-progress`. The store keeps the active queue in host order, so
//! the head is the item currently being worked on.

use lodestone_host::payload::DOWNLOAD_EVENT;
use lodestone_host::{
    DownloadPayload, EventBus, EventPump, HostClient, HostError, HostEventUpstream,
};
use lodestone_store::{EventStore, HandlerError, Reducer};
use log::{info, warn};
use std::sync::Arc;

pub type DownloadEvent = Result<DownloadPayload, HostError>;
pub type DownloadStore = EventStore<DownloadReducer>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadItem {
    pub id: u64,
    pub name: String,
    pub total_bytes: u64,
    pub downloaded_bytes: u64,
}

impl DownloadItem {
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.downloaded_bytes as f64 / self.total_bytes as f64
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DownloadQueue {
    pub items: Vec<DownloadItem>,
    /// Downloads that finished since startup.
    pub completed: u64,
    /// Downloads that failed since startup.
    pub failed: u64,
    pub last_error: Option<String>,
}

impl DownloadQueue {
    pub fn head(&self) -> Option<&DownloadItem> {
        self.items.first()
    }

    pub fn is_idle(&self) -> bool {
        self.items.is_empty()
    }

    /// `(downloaded, total)` bytes across everything still queued.
    pub fn aggregate(&self) -> (u64, u64) {
        self.items.iter().fold((0, 0), |(done, total), item| {
            (
                done.saturating_add(item.downloaded_bytes),
                total.saturating_add(item.total_bytes),
            )
        })
    }

    /// Aggregate progress in `0.0..=1.0`; an idle queue reports 0.
    pub fn fraction(&self) -> f64 {
        match self.aggregate() {
            (_, 0) => 0.0,
            (done, total) => done as f64 / total as f64,
        }
    }

    fn position(&self, id: u64) -> Option<usize> {
        self.items.iter().position(|item| item.id == id)
    }
}

pub struct DownloadReducer;

impl Reducer for DownloadReducer {
    type State = DownloadQueue;
    type Event = DownloadEvent;

    fn reduce(
        &self,
        prior: &DownloadQueue,
        event: DownloadEvent,
    ) -> Result<Option<DownloadQueue>, HandlerError> {
        let payload = match event {
            Ok(payload) => payload,
            Err(e) => {
                let message = e.to_string();
                if prior.last_error.as_deref() == Some(message.as_str()) {
                    return Ok(None);
                }
                let mut next = prior.clone();
                next.last_error = Some(message);
                return Ok(Some(next));
            }
        };

        let mut next = prior.clone();
        match payload {
            DownloadPayload::Queued {
                id,
                name,
                total_bytes,
            } => {
                if prior.position(id).is_some() {
                    return Ok(None);
                }
                next.items.push(DownloadItem {
                    id,
                    name,
                    total_bytes,
                    downloaded_bytes: 0,
                });
            }
            DownloadPayload::Progress {
                id,
                downloaded_bytes,
            } => {
                let Some(index) = prior.position(id) else {
                    return Ok(None);
                };
                let item = &mut next.items[index];
                let clamped = downloaded_bytes.min(item.total_bytes);
                if clamped == item.downloaded_bytes {
                    return Ok(None);
                }
                item.downloaded_bytes = clamped;
            }
            DownloadPayload::Finished { id } => {
                let Some(index) = prior.position(id) else {
                    return Ok(None);
                };
                next.items.remove(index);
                next.completed += 1;
            }
            DownloadPayload::Failed { id, reason } => {
                let label = match prior.position(id) {
                    Some(index) => next.items.remove(index).name,
                    None => format!("download {}", id),
                };
                next.failed += 1;
                next.last_error = Some(format!("{}: {}", label, reason));
            }
        }

        Ok(Some(next))
    }
}

pub fn new_store(bus: Arc<EventBus>, pump: EventPump) -> DownloadStore {
    EventStore::new(
        DownloadQueue::default(),
        DownloadReducer,
        HostEventUpstream::new(DOWNLOAD_EVENT, bus, pump),
    )
}

#[derive(Clone)]
pub struct DownloadService {
    store: DownloadStore,
    client: HostClient,
}

impl DownloadService {
    pub fn new(store: DownloadStore, client: HostClient) -> Self {
        Self { store, client }
    }

    pub fn store(&self) -> &DownloadStore {
        &self.store
    }

    /// Ask the host to download `name`. Returns the host's download id.
    pub async fn queue(&self, name: &str, total_bytes: u64) -> Result<u64, HostError> {
        match self.client.queue_download(name, total_bytes).await {
            Ok(id) => {
                info!("Queued download {} ({}, {} bytes)", id, name, total_bytes);
                Ok(id)
            }
            Err(e) => {
                warn!("Host refused download {}: {}", name, e);
                Err(e)
            }
        }
    }
}
