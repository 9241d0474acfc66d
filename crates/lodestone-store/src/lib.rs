//! lodestone-store: observable stores over native-host push sources
//!
//! - [`EventStore`]: synchronous snapshot plus subscribe, with the upstream
//!   connected only while someone is subscribed
//! - [`Notifier`]: change fan-out with per-callback failure isolation
//! - [`Upstream`]: the seam a push source implements
//!
//! Everything here is single-threaded (`Rc`/`RefCell`). Stores live on the
//! UI thread; cross-thread sources hand events over through a pump.

pub mod error;
pub mod notifier;
pub mod store;
pub mod upstream;

pub use error::{HandlerError, SubscriptionError};
pub use notifier::{Callback, Notifier};
pub use store::{EventStore, FnReducer, Reducer, Subscription};
pub use upstream::{Detached, EventSink, Upstream, UpstreamHandle};
