//! Named host events and their payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A profile's game process started or stopped.
pub const RUN_STATE_EVENT: &str = "profile-run-state";
/// Download queue activity.
pub const DOWNLOAD_EVENT: &str = "download-progress";
/// The signed-in account changed.
pub const AUTH_EVENT: &str = "auth-changed";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatePayload {
    pub profile: String,
    pub state: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DownloadPayload {
    Queued {
        id: u64,
        name: String,
        total_bytes: u64,
    },
    Progress {
        id: u64,
        downloaded_bytes: u64,
    },
    Finished {
        id: u64,
    },
    Failed {
        id: u64,
        reason: String,
    },
}

impl DownloadPayload {
    pub fn id(&self) -> u64 {
        match self {
            DownloadPayload::Queued { id, .. }
            | DownloadPayload::Progress { id, .. }
            | DownloadPayload::Finished { id }
            | DownloadPayload::Failed { id, .. } => *id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountPayload {
    pub username: String,
    pub uuid: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthPayload {
    pub account: Option<AccountPayload>,
}
