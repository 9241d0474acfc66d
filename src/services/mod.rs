//! Launcher state services.
//!
//! Each service is an `EventStore` over one host source plus the host
//! commands that act on it. Subscriber counting and upstream teardown live
//! in the store, never here.
//!
//! - `process_state` - Which profiles have a running game
//! - `downloads` - Download queue head and aggregate progress
//! - `window_state` - Launcher window maximize flag (polled)
//! - `session` - Signed-in account, one store per session

pub mod downloads;
pub mod process_state;
pub mod session;
pub mod window_state;

pub use downloads::DownloadService;
pub use process_state::ProcessService;
pub use session::SessionScope;
pub use window_state::WindowService;
