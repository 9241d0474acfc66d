//! Error types for lodestone-store

/// The upstream push source could not be connected.
///
/// Non-fatal: the store keeps its last-known snapshot and retries on the
/// next subscribe while it is still observed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to subscribe to {source_name}: {reason}")]
pub struct SubscriptionError {
    pub source_name: String,
    pub reason: String,
}

impl SubscriptionError {
    pub fn new(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }
}

/// A reducer refused an event. The event is dropped and the state is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("reducer failed: {0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
