//! Lodestone - game launcher front-end state
//!
//! Observable stores fed by the native host, drained on a fixed UI tick.

mod config;
mod console;
mod context;
mod services;

use config::Config;
use context::{AppContext, HostLink};
use lodestone_host::{EventBus, LoopbackHost};
use log::{error, info, warn};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

const DEMO_DOWNLOADS: [(&str, u64); 2] = [("client.jar", 24_000_000), ("assets", 310_000_000)];

#[derive(Default)]
struct Args {
    config: Option<PathBuf>,
    exit_when_idle: bool,
    write_config: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => match iter.next() {
                Some(path) => args.config = Some(PathBuf::from(path)),
                None => return Err("--config needs a path".to_string()),
            },
            "--exit-when-idle" => args.exit_when_idle = true,
            "--write-config" => args.write_config = true,
            other => return Err(format!("unknown argument: {}", other)),
        }
    }
    Ok(args)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = parse_args()?;

    let config_path = args.config.clone().or_else(Config::default_path);
    let (config, load_error) = match &config_path {
        Some(path) => match Config::try_load(path) {
            Ok(config) => (config, None),
            Err(e) => (Config::default(), Some(e)),
        },
        None => (Config::default(), None),
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_filter))
        .init();

    info!("Starting Lodestone...");
    if let Some(e) = load_error {
        warn!("Using default config: {}", e);
    }
    if args.write_config {
        match &config_path {
            Some(path) => {
                config.save(path)?;
                info!("Wrote config to {}", path.display());
            }
            None => warn!("No config directory available, nothing written"),
        }
    }

    let host = Arc::new(LoopbackHost::new(Arc::new(EventBus::new())));
    let ctx = AppContext::init(&config, HostLink::loopback(&host));
    let views = console::attach(&ctx);

    for profile in &config.profiles {
        match ctx.processes.refresh(profile).await {
            Ok(running) => info!("Profile {} running: {}", profile, running),
            Err(e) => warn!("Could not query {}: {}", profile, e),
        }
    }

    let session = ctx.open_session();
    let account_view = console::attach_session(&session);
    if let Err(e) = session.sign_in("Player").await {
        error!("Sign-in failed: {}", e);
    }

    let mut queued = 0;
    for (name, size) in DEMO_DOWNLOADS {
        if ctx.downloads.queue(name, size).await.is_ok() {
            queued += 1;
        }
    }
    if let Some(profile) = config.profiles.first()
        && let Err(e) = ctx.processes.launch(profile).await
    {
        warn!("Launch failed: {}", e);
    }
    if let Err(e) = ctx.window.toggle().await {
        warn!("Maximize toggle failed: {}", e);
    }

    let mut ticker = tokio::time::interval(config.poll_interval());
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                ctx.tick();
                if args.exit_when_idle {
                    let queue = ctx.downloads.store().snapshot();
                    if queue.is_idle() && queue.completed + queue.failed >= queued {
                        info!("Downloads settled, exiting");
                        break;
                    }
                }
            }
            _ = &mut ctrl_c => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    if let Some(profile) = config.profiles.first()
        && ctx.processes.store().snapshot().is_running(profile)
        && let Err(e) = ctx.processes.stop(profile).await
    {
        warn!("Stop failed: {}", e);
    }
    ctx.tick();

    drop(account_view);
    if let Err(e) = session.sign_out().await {
        warn!("Sign-out failed: {}", e);
    }
    session.close();
    drop(views);
    ctx.destroy();
    host.shutdown();

    info!("Lodestone stopped.");
    Ok(())
}
