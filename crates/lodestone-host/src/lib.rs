//! lodestone-host: the launcher's view of its native host
//!
//! - Commands: request/response calls through a [`CommandTransport`]
//! - Events: named broadcast channels on the [`EventBus`]
//! - [`EventPump`]: hands bus traffic to single-threaded stores on a UI tick
//! - [`HostEventUpstream`] / [`PollingUpstream`]: `Upstream` adapters for stores
//! - [`LoopbackHost`]: in-process host used by the launcher binary and tests

pub mod bus;
pub mod command;
pub mod error;
pub mod loopback;
pub mod payload;
pub mod pump;
pub mod upstream;

pub use bus::EventBus;
pub use command::{CommandTransport, HostClient, HostCommand};
pub use error::HostError;
pub use loopback::LoopbackHost;
pub use payload::{AccountPayload, AuthPayload, DownloadPayload, RunStatePayload};
pub use pump::{EventPump, SourceId};
pub use upstream::{HostEventUpstream, PollingUpstream};
