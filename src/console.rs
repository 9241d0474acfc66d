//! Console views.
//!
//! Stand-ins for the launcher's panels: each one subscribes to a store and
//! logs what a panel would render whenever the snapshot changes.

use crate::context::AppContext;
use crate::services::SessionScope;
use chrono::Utc;
use lodestone_store::Subscription;
use log::{info, warn};

/// Attach the run state, download and window views.
pub fn attach(ctx: &AppContext) -> Vec<Subscription> {
    let processes = ctx.processes.store().clone();
    let run_view = ctx.processes.store().subscribe(move || {
        let snapshot = processes.snapshot();
        if let Some(error) = &snapshot.last_error {
            warn!("[profiles] {}", error);
        }
        let running: Vec<&str> = snapshot.running.iter().map(String::as_str).collect();
        info!("[profiles] running: {:?}", running);
    });

    let downloads = ctx.downloads.store().clone();
    let download_view = ctx.downloads.store().subscribe(move || {
        let queue = downloads.snapshot();
        if let Some(error) = &queue.last_error {
            warn!("[downloads] {}", error);
        }
        match queue.head() {
            Some(item) => info!(
                "[downloads] {} {:.0}% ({} queued, {:.0}% overall)",
                item.name,
                item.fraction() * 100.0,
                queue.items.len(),
                queue.fraction() * 100.0
            ),
            None => info!(
                "[downloads] idle ({} done, {} failed)",
                queue.completed, queue.failed
            ),
        }
    });

    let window = ctx.window.store().clone();
    let window_view = ctx.window.store().subscribe(move || {
        let state = window.snapshot();
        if state.probe_failed {
            warn!("[window] host unreachable, last known maximized={}", state.maximized);
        } else {
            info!("[window] maximized={}", state.maximized);
        }
    });

    vec![run_view, download_view, window_view]
}

/// Attach the account view for one session.
pub fn attach_session(scope: &SessionScope) -> Subscription {
    let auth = scope.auth().clone();
    scope.auth().subscribe(move || {
        let state = auth.snapshot();
        match &state.account {
            Some(account) => info!(
                "[account] {} ({}) until {}",
                account.username,
                account.uuid,
                account.expires_at.format("%Y-%m-%d %H:%M UTC")
            ),
            None => info!("[account] signed out"),
        }
        if let Some(account) = &state.account
            && account.is_expired(Utc::now())
        {
            warn!("[account] session for {} has expired", account.username);
        }
        if let Some(error) = &state.last_error {
            warn!("[account] {}", error);
        }
    })
}
