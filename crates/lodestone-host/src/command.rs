//! Request/response commands to the native host.

use crate::error::HostError;
use crate::payload::AccountPayload;
use async_trait::async_trait;
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Commands the native host understands.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum HostCommand {
    IsRunning { profile: String },
    Launch { profile: String },
    Stop { profile: String },
    QueueDownload { name: String, total_bytes: u64 },
    IsMaximized,
    SetMaximized { maximized: bool },
    SignIn { username: String },
    SignOut,
}

impl HostCommand {
    pub fn name(&self) -> &'static str {
        match self {
            HostCommand::IsRunning { .. } => "is_running",
            HostCommand::Launch { .. } => "launch",
            HostCommand::Stop { .. } => "stop",
            HostCommand::QueueDownload { .. } => "queue_download",
            HostCommand::IsMaximized => "is_maximized",
            HostCommand::SetMaximized { .. } => "set_maximized",
            HostCommand::SignIn { .. } => "sign_in",
            HostCommand::SignOut => "sign_out",
        }
    }
}

/// Anything that can carry a command to the host and bring back its answer.
#[async_trait]
pub trait CommandTransport: Send + Sync {
    async fn invoke(&self, command: HostCommand) -> Result<Value, HostError>;
}

/// Typed wrapper over a [`CommandTransport`].
#[derive(Clone)]
pub struct HostClient {
    transport: Arc<dyn CommandTransport>,
}

impl HostClient {
    pub fn new(transport: Arc<dyn CommandTransport>) -> Self {
        Self { transport }
    }

    async fn call<T: DeserializeOwned>(&self, command: HostCommand) -> Result<T, HostError> {
        let name = command.name();
        debug!("Invoking host command {}", name);
        let value = self.transport.invoke(command).await?;
        serde_json::from_value(value).map_err(|source| HostError::Decode {
            what: format!("{} response", name),
            source,
        })
    }

    pub async fn is_running(&self, profile: &str) -> Result<bool, HostError> {
        self.call(HostCommand::IsRunning {
            profile: profile.to_string(),
        })
        .await
    }

    pub async fn launch(&self, profile: &str) -> Result<(), HostError> {
        self.call::<Value>(HostCommand::Launch {
            profile: profile.to_string(),
        })
        .await
        .map(drop)
    }

    pub async fn stop(&self, profile: &str) -> Result<(), HostError> {
        self.call::<Value>(HostCommand::Stop {
            profile: profile.to_string(),
        })
        .await
        .map(drop)
    }

    /// Returns the id the host assigned to the download.
    pub async fn queue_download(&self, name: &str, total_bytes: u64) -> Result<u64, HostError> {
        self.call(HostCommand::QueueDownload {
            name: name.to_string(),
            total_bytes,
        })
        .await
    }

    pub async fn is_maximized(&self) -> Result<bool, HostError> {
        self.call(HostCommand::IsMaximized).await
    }

    pub async fn set_maximized(&self, maximized: bool) -> Result<(), HostError> {
        self.call::<Value>(HostCommand::SetMaximized { maximized })
            .await
            .map(drop)
    }

    pub async fn sign_in(&self, username: &str) -> Result<AccountPayload, HostError> {
        self.call(HostCommand::SignIn {
            username: username.to_string(),
        })
        .await
    }

    pub async fn sign_out(&self) -> Result<(), HostError> {
        self.call::<Value>(HostCommand::SignOut).await.map(drop)
    }
}
