use anyhow::Context;
use clap::Parser;
use position_watch::browser::ChromeLauncher;
use position_watch::core::config::CliArgs;
use position_watch::logging::init_logging;
use position_watch::scheduler::{ScanScheduler, WatchContext, WatchStatus};
use position_watch::server::{run_server, AppState};
use position_watch::WebhookNotifier;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_format);

    let config = args.into_config().context("invalid configuration")?;
    info!(
        url = %config.target_url,
        state_file = %config.state_file.display(),
        open_confirm = config.scan.open_confirm_scans,
        close_confirm = config.scan.close_confirm_scans,
        "starting position watcher"
    );

    let context = WatchContext::from_config(ChromeLauncher, &config).await;
    let notifier = WebhookNotifier::new(&config.notify)?;
    let status = Arc::new(RwLock::new(WatchStatus::new(config.target_url.clone())));
    let (command_tx, command_rx) = mpsc::channel(16);

    let http = config.http.clone();
    let app_state = AppState::new(Arc::clone(&status), command_tx);
    tokio::spawn(async move {
        if let Err(e) = run_server(http, app_state).await {
            error!(error = %e, "diagnostic server failed");
        }
    });

    let scheduler = ScanScheduler::new(config, context, notifier, status)?;
    scheduler
        .run(command_rx, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "could not listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!("position watcher stopped");
    Ok(())
}
