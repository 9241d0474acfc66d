//! In-process native host.
//!
//! Answers commands from memory and pushes the matching events onto the bus,
//! the way the real host does after it has done the actual work. Downloads
//! are simulated by a spawned task that reports progress in chunks.

use crate::bus::EventBus;
use crate::command::{CommandTransport, HostCommand};
use crate::error::HostError;
use crate::payload::{
    AUTH_EVENT, AccountPayload, AuthPayload, DOWNLOAD_EVENT, DownloadPayload, RUN_STATE_EVENT,
    RunStatePayload,
};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use log::{debug, info, warn};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Number of progress events per simulated download.
const DOWNLOAD_CHUNKS: u64 = 8;
/// How long a simulated sign-in stays valid.
const SESSION_HOURS: i64 = 24;

#[derive(Default)]
struct HostState {
    running: BTreeSet<String>,
    account: Option<AccountPayload>,
}

pub struct LoopbackHost {
    bus: Arc<EventBus>,
    state: Mutex<HostState>,
    maximized: Arc<AtomicBool>,
    online: Arc<AtomicBool>,
    next_download: AtomicU64,
    chunk_delay: Duration,
}

impl LoopbackHost {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            state: Mutex::new(HostState::default()),
            maximized: Arc::new(AtomicBool::new(false)),
            online: Arc::new(AtomicBool::new(true)),
            next_download: AtomicU64::new(1),
            chunk_delay: Duration::from_millis(150),
        }
    }

    /// Delay between simulated download chunks.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Synchronous maximize query for polling upstreams.
    /// Fails with `Unreachable` once the host is shut down.
    pub fn maximized_probe(&self) -> impl Fn() -> Result<bool, HostError> + Send + Sync + 'static {
        let maximized = Arc::clone(&self.maximized);
        let online = Arc::clone(&self.online);
        move || {
            if !online.load(Ordering::SeqCst) {
                return Err(HostError::Unreachable);
            }
            Ok(maximized.load(Ordering::SeqCst))
        }
    }

    /// The user resized the window outside the launcher's control.
    pub fn set_window_maximized(&self, maximized: bool) {
        self.maximized.store(maximized, Ordering::SeqCst);
    }

    /// A game process ended on its own (closed or crashed).
    pub fn process_exited(&self, profile: &str) {
        let removed = self
            .state
            .lock()
            .map(|mut state| state.running.remove(profile))
            .unwrap_or(false);
        if removed {
            info!("Process for {} exited", profile);
            self.emit_run_state(profile, false);
        }
    }

    /// Stop answering commands and close every event channel.
    pub fn shutdown(&self) {
        self.online.store(false, Ordering::SeqCst);
        self.bus.shutdown();
    }

    fn emit_run_state(&self, profile: &str, state: bool) {
        let payload = RunStatePayload {
            profile: profile.to_string(),
            state,
        };
        if let Err(e) = self.bus.emit_json(RUN_STATE_EVENT, &payload) {
            warn!("Failed to emit run state: {}", e);
        }
    }

    fn with_state<T>(
        &self,
        command: &HostCommand,
        f: impl FnOnce(&mut HostState) -> Result<T, HostError>,
    ) -> Result<T, HostError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| HostError::rejected(command.name(), "host state poisoned"))?;
        f(&mut state)
    }

    fn queue_download(&self, name: String, total_bytes: u64) -> Result<Value, HostError> {
        let id = self.next_download.fetch_add(1, Ordering::SeqCst);
        self.bus.emit_json(
            DOWNLOAD_EVENT,
            &DownloadPayload::Queued {
                id,
                name: name.clone(),
                total_bytes,
            },
        )?;

        let bus = Arc::clone(&self.bus);
        let delay = self.chunk_delay;
        tokio::spawn(async move {
            let chunk = total_bytes.div_ceil(DOWNLOAD_CHUNKS).max(1);
            let mut downloaded = 0;
            while downloaded < total_bytes {
                tokio::time::sleep(delay).await;
                if bus.is_shut_down() {
                    debug!("Bus closed, abandoning simulated download {}", id);
                    return;
                }
                downloaded = (downloaded + chunk).min(total_bytes);
                emit_download(
                    &bus,
                    &DownloadPayload::Progress {
                        id,
                        downloaded_bytes: downloaded,
                    },
                );
            }
            emit_download(&bus, &DownloadPayload::Finished { id });
            debug!("Simulated download {} ({}) finished", id, name);
        });

        Ok(json!(id))
    }
}

#[async_trait]
impl CommandTransport for LoopbackHost {
    async fn invoke(&self, command: HostCommand) -> Result<Value, HostError> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(HostError::Unreachable);
        }

        match command.clone() {
            HostCommand::IsRunning { profile } => {
                self.with_state(&command, |state| Ok(json!(state.running.contains(&profile))))
            }
            HostCommand::Launch { profile } => {
                self.with_state(&command, |state| {
                    if !state.running.insert(profile.clone()) {
                        let reason = format!("{} is already running", profile);
                        return Err(HostError::rejected("launch", reason));
                    }
                    Ok(())
                })?;
                info!("Launched {}", profile);
                self.emit_run_state(&profile, true);
                Ok(Value::Null)
            }
            HostCommand::Stop { profile } => {
                self.with_state(&command, |state| {
                    if !state.running.remove(&profile) {
                        let reason = format!("{} is not running", profile);
                        return Err(HostError::rejected("stop", reason));
                    }
                    Ok(())
                })?;
                info!("Stopped {}", profile);
                self.emit_run_state(&profile, false);
                Ok(Value::Null)
            }
            HostCommand::QueueDownload { name, total_bytes } => {
                self.queue_download(name, total_bytes)
            }
            HostCommand::IsMaximized => Ok(json!(self.maximized.load(Ordering::SeqCst))),
            HostCommand::SetMaximized { maximized } => {
                self.set_window_maximized(maximized);
                Ok(Value::Null)
            }
            HostCommand::SignIn { username } => {
                if username.trim().is_empty() {
                    return Err(HostError::rejected("sign_in", "username is empty"));
                }
                let account = AccountPayload {
                    uuid: offline_uuid(&username),
                    username,
                    expires_at: Utc::now() + ChronoDuration::hours(SESSION_HOURS),
                };
                self.with_state(&command, |state| {
                    state.account = Some(account.clone());
                    Ok(())
                })?;
                self.bus.emit_json(
                    AUTH_EVENT,
                    &AuthPayload {
                        account: Some(account.clone()),
                    },
                )?;
                serde_json::to_value(&account).map_err(|source| HostError::Encode {
                    what: "sign_in response".to_string(),
                    source,
                })
            }
            HostCommand::SignOut => {
                let had_account =
                    self.with_state(&command, |state| Ok(state.account.take().is_some()))?;
                if had_account {
                    self.bus.emit_json(AUTH_EVENT, &AuthPayload::default())?;
                }
                Ok(Value::Null)
            }
        }
    }
}

fn emit_download(bus: &EventBus, payload: &DownloadPayload) {
    if let Err(e) = bus.emit_json(DOWNLOAD_EVENT, payload) {
        warn!("Failed to emit download progress: {}", e);
    }
}

/// Stable account id for a username, formatted like a UUID.
fn offline_uuid(username: &str) -> String {
    let digest = Sha256::digest(format!("OfflinePlayer:{}", username).as_bytes());
    let hex = hex::encode(&digest[..16]);
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::HostClient;
    use tokio::sync::broadcast::error::TryRecvError;

    fn client_for(host: &Arc<LoopbackHost>) -> HostClient {
        HostClient::new(Arc::clone(host) as Arc<dyn CommandTransport>)
    }

    #[tokio::test]
    async fn test_launch_and_stop_emit_run_state() {
        let bus = Arc::new(EventBus::new());
        let host = Arc::new(LoopbackHost::new(Arc::clone(&bus)));
        let client = client_for(&host);
        let mut rx = bus.listen(RUN_STATE_EVENT).unwrap();

        client.launch("A").await.unwrap();
        assert!(client.is_running("A").await.unwrap());
        client.stop("A").await.unwrap();

        let first: RunStatePayload = serde_json::from_value(rx.try_recv().unwrap()).unwrap();
        let second: RunStatePayload = serde_json::from_value(rx.try_recv().unwrap()).unwrap();
        assert!(first.state);
        assert!(!second.state);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_double_launch_is_rejected() {
        let host = Arc::new(LoopbackHost::new(Arc::new(EventBus::new())));
        let client = client_for(&host);

        client.launch("A").await.unwrap();
        let err = client.launch("A").await.unwrap_err();
        assert!(matches!(err, HostError::Rejected { .. }));

        let err = client.stop("B").await.unwrap_err();
        assert_eq!(err.to_string(), "host rejected stop: B is not running");
    }

    #[tokio::test]
    async fn test_shutdown_makes_host_unreachable() {
        let host = Arc::new(LoopbackHost::new(Arc::new(EventBus::new())));
        let client = client_for(&host);
        let probe = host.maximized_probe();

        host.shutdown();

        assert!(matches!(client.is_running("A").await, Err(HostError::Unreachable)));
        assert!(matches!(probe(), Err(HostError::Unreachable)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_reports_progress_then_finishes() {
        let bus = Arc::new(EventBus::new());
        let host = Arc::new(
            LoopbackHost::new(Arc::clone(&bus)).with_chunk_delay(Duration::from_millis(10)),
        );
        let client = client_for(&host);
        let mut rx = bus.listen(DOWNLOAD_EVENT).unwrap();

        let id = client.queue_download("assets", 100).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let mut events = Vec::new();
        while let Ok(value) = rx.try_recv() {
            events.push(serde_json::from_value::<DownloadPayload>(value).unwrap());
        }

        assert_eq!(events.len(), DOWNLOAD_CHUNKS as usize + 2);
        assert!(events.iter().all(|e| e.id() == id));
        assert_eq!(
            events[events.len() - 2],
            DownloadPayload::Progress {
                id,
                downloaded_bytes: 100
            }
        );
        assert_eq!(events.last(), Some(&DownloadPayload::Finished { id }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_task_stops_after_shutdown() {
        let bus = Arc::new(EventBus::new());
        let host = Arc::new(
            LoopbackHost::new(Arc::clone(&bus)).with_chunk_delay(Duration::from_millis(10)),
        );
        let client = client_for(&host);

        client.queue_download("assets", 100).await.unwrap();
        // Held by the test, the host and the download task.
        assert_eq!(Arc::strong_count(&bus), 3);

        host.shutdown();
        tokio::time::sleep(Duration::from_millis(15)).await;
        assert_eq!(Arc::strong_count(&bus), 2);
    }

    #[tokio::test]
    async fn test_sign_in_derives_stable_uuid() {
        let bus = Arc::new(EventBus::new());
        let host = Arc::new(LoopbackHost::new(Arc::clone(&bus)));
        let client = client_for(&host);
        let mut rx = bus.listen(AUTH_EVENT).unwrap();

        let first = client.sign_in("Steve").await.unwrap();
        client.sign_out().await.unwrap();
        let second = client.sign_in("Steve").await.unwrap();

        assert_eq!(first.uuid, second.uuid);
        assert_eq!(first.uuid.len(), 36);
        assert!(first.expires_at > Utc::now());

        let signed_in: AuthPayload = serde_json::from_value(rx.try_recv().unwrap()).unwrap();
        let signed_out: AuthPayload = serde_json::from_value(rx.try_recv().unwrap()).unwrap();
        assert_eq!(signed_in.account.map(|a| a.username), Some("Steve".to_string()));
        assert_eq!(signed_out.account, None);
    }

    #[test]
    fn test_process_exit_emits_once() {
        let bus = Arc::new(EventBus::new());
        let host = LoopbackHost::new(Arc::clone(&bus));
        let mut rx = bus.listen(RUN_STATE_EVENT).unwrap();

        host.state.lock().unwrap().running.insert("A".to_string());
        host.process_exited("A");
        host.process_exited("A");

        assert!(rx.try_recv().is_ok());
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }
}
