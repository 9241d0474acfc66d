//! Composition root state.
//!
//! Every process-wide store is built here and handed to whoever needs it.
//! Nothing lives in a module-level static.

use crate::config::Config;
use crate::services::{
    DownloadService, ProcessService, SessionScope, WindowService, downloads, process_state,
    window_state,
};
use lodestone_host::{CommandTransport, EventBus, EventPump, HostClient, HostError, LoopbackHost};
use log::info;
use std::sync::Arc;

/// Synchronous host query used by polling stores.
pub type WindowProbe = Box<dyn Fn() -> Result<bool, HostError>>;

/// Everything the launcher needs from its native host.
pub struct HostLink {
    pub bus: Arc<EventBus>,
    pub transport: Arc<dyn CommandTransport>,
    pub window_probe: WindowProbe,
}

impl HostLink {
    pub fn loopback(host: &Arc<LoopbackHost>) -> Self {
        Self {
            bus: Arc::clone(host.bus()),
            transport: Arc::clone(host) as Arc<dyn CommandTransport>,
            window_probe: Box::new(host.maximized_probe()),
        }
    }
}

pub struct AppContext {
    bus: Arc<EventBus>,
    pump: EventPump,
    client: HostClient,
    pub processes: ProcessService,
    pub downloads: DownloadService,
    pub window: WindowService,
}

impl AppContext {
    pub fn init(config: &Config, link: HostLink) -> Self {
        info!("Initializing launcher stores...");

        let HostLink {
            bus,
            transport,
            window_probe,
        } = link;
        let pump = EventPump::new();
        let client = HostClient::new(transport);

        let processes = ProcessService::new(
            process_state::new_store(Arc::clone(&bus), pump.clone()),
            client.clone(),
        );
        let downloads = DownloadService::new(
            downloads::new_store(Arc::clone(&bus), pump.clone()),
            client.clone(),
        );
        let window = WindowService::new(
            window_state::new_store(pump.clone(), config.window_poll_interval(), window_probe),
            client.clone(),
        );

        Self {
            bus,
            pump,
            client,
            processes,
            downloads,
            window,
        }
    }

    /// Hand pending host traffic to the stores. Call from the UI tick.
    pub fn tick(&self) -> usize {
        self.pump.drain()
    }

    /// A fresh auth-bound scope for one signed-in session.
    pub fn open_session(&self) -> SessionScope {
        SessionScope::open(Arc::clone(&self.bus), self.pump.clone(), self.client.clone())
    }

    /// Detach every store from the host and close the event channels.
    pub fn destroy(self) {
        info!("Tearing down launcher stores...");
        self.processes.store().close();
        self.downloads.store().close();
        self.window.store().close();
        self.pump.shutdown();
        self.bus.shutdown();
    }
}
