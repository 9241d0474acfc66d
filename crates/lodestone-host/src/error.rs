//! Error types for lodestone-host

/// Errors reported by the native host or the channel to it.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("host rejected {command}: {reason}")]
    Rejected { command: String, reason: String },

    #[error("native host is unreachable")]
    Unreachable,

    #[error("event channel disconnected")]
    Disconnected,

    #[error("missed {0} events")]
    Lagged(u64),

    #[error("failed to encode {what}: {source}")]
    Encode {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode {what}: {source}")]
    Decode {
        what: String,
        #[source]
        source: serde_json::Error,
    },
}

impl HostError {
    pub fn rejected(command: impl Into<String>, reason: impl Into<String>) -> Self {
        HostError::Rejected {
            command: command.into(),
            reason: reason.into(),
        }
    }
}
