//! Signed-in account, scoped to one authenticated session.
//!
//! A [`SessionScope`] owns its own auth store. Closing the scope closes the
//! store, which drops its views' callbacks and disconnects it from the host
//! even if views still hold subscriptions.

use chrono::{DateTime, Utc};
use lodestone_host::payload::AUTH_EVENT;
use lodestone_host::{
    AccountPayload, AuthPayload, EventBus, EventPump, HostClient, HostError, HostEventUpstream,
};
use lodestone_store::{EventStore, HandlerError, Reducer};
use log::info;
use std::sync::Arc;

pub type AuthEvent = Result<AuthPayload, HostError>;
pub type AuthStore = EventStore<AuthReducer>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub username: String,
    pub uuid: String,
    pub expires_at: DateTime<Utc>,
}

impl Account {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl From<AccountPayload> for Account {
    fn from(payload: AccountPayload) -> Self {
        Self {
            username: payload.username,
            uuid: payload.uuid,
            expires_at: payload.expires_at,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthState {
    pub account: Option<Account>,
    pub last_error: Option<String>,
}

impl AuthState {
    pub fn is_signed_in(&self) -> bool {
        self.account.is_some()
    }
}

pub struct AuthReducer;

impl Reducer for AuthReducer {
    type State = AuthState;
    type Event = AuthEvent;

    fn reduce(
        &self,
        prior: &AuthState,
        event: AuthEvent,
    ) -> Result<Option<AuthState>, HandlerError> {
        let next = match event {
            Ok(payload) => AuthState {
                account: payload.account.map(Account::from),
                last_error: None,
            },
            Err(e) => AuthState {
                account: prior.account.clone(),
                last_error: Some(e.to_string()),
            },
        };
        Ok((next != *prior).then_some(next))
    }
}

pub struct SessionScope {
    auth: AuthStore,
    client: HostClient,
}

impl SessionScope {
    pub fn open(bus: Arc<EventBus>, pump: EventPump, client: HostClient) -> Self {
        info!("Opening session scope");
        Self {
            auth: EventStore::new(
                AuthState::default(),
                AuthReducer,
                HostEventUpstream::new(AUTH_EVENT, bus, pump),
            ),
            client,
        }
    }

    pub fn auth(&self) -> &AuthStore {
        &self.auth
    }

    pub async fn sign_in(&self, username: &str) -> Result<Account, HostError> {
        let payload = self.client.sign_in(username).await?;
        self.auth.apply(Ok(AuthPayload {
            account: Some(payload.clone()),
        }));
        info!("Signed in as {}", payload.username);
        Ok(payload.into())
    }

    pub async fn sign_out(&self) -> Result<(), HostError> {
        self.client.sign_out().await?;
        self.auth.apply(Ok(AuthPayload::default()));
        info!("Signed out");
        Ok(())
    }

    pub fn close(self) {
        info!("Closing session scope");
        self.auth.close();
    }
}
