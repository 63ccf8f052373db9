//! Fixed-rate driver: one tick per scan interval, each tick isolated from
//! the failures of the previous one.

use crate::browser::navigation::{NavigationController, NavigationOutcome};
use crate::browser::session::BrowserSession;
use crate::core::config::Config;
use crate::core::{BrowserLauncher, DomQuery, RowInspection};
use crate::dom::extractor::FrameExtractor;
use crate::dom::row::RowParser;
use crate::errors::{Result, WatchError};
use crate::notify::{NotificationDispatcher, Notifier};
use crate::tracker::{LifecycleTracker, StateStore, Thresholds};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Read-only view of the watcher, published for the diagnostic surface.
#[derive(Debug, Clone, Serialize)]
pub struct WatchStatus {
    pub target_url: String,
    pub started_at: DateTime<Utc>,
    pub last_scan_at: Option<DateTime<Utc>>,
    pub last_reload_at: Option<DateTime<Utc>>,
    pub session_active: bool,
    pub tracked_orders: usize,
    pub open_positions: usize,
    pub last_error: Option<String>,
}

impl WatchStatus {
    pub fn new(target_url: impl Into<String>) -> Self {
        Self {
            target_url: target_url.into(),
            started_at: Utc::now(),
            last_scan_at: None,
            last_reload_at: None,
            session_active: false,
            tracked_orders: 0,
            open_positions: 0,
            last_error: None,
        }
    }
}

pub type SharedStatus = Arc<RwLock<WatchStatus>>;

/// Operator requests served between ticks.
#[derive(Debug)]
pub enum ControlCommand {
    /// Treat every currently visible row as already announced.
    Baseline {
        reply: oneshot::Sender<Result<usize>>,
    },
    Inspect {
        reply: oneshot::Sender<Result<RowInspection>>,
    },
}

/// Everything a tick mutates, owned by the scheduler task.
pub struct WatchContext<L: BrowserLauncher> {
    pub session: BrowserSession<L>,
    pub navigation: Arc<NavigationController>,
    pub tracker: LifecycleTracker,
    pub store: StateStore,
}

impl<L: BrowserLauncher> WatchContext<L> {
    /// Wire a context from configuration, resuming from the state file.
    pub async fn from_config(launcher: L, config: &Config) -> Self {
        let store = StateStore::new(config.state_file.clone());
        let orders = store.load().await;
        let thresholds = Thresholds::new(
            config.scan.open_confirm_scans,
            config.scan.close_confirm_scans,
        );

        Self {
            session: BrowserSession::new(launcher, config.browser.clone()),
            navigation: Arc::new(NavigationController::new(
                config.navigation.clone(),
                config.selectors.row.clone(),
            )),
            tracker: LifecycleTracker::with_orders(thresholds, orders),
            store,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No browser could be started; nothing else ran.
    SessionUnavailable,
    /// A navigation was already in flight.
    Skipped,
    Navigated(NavigationOutcome),
    Scanned { rows: usize, events: usize },
}

pub struct ScanScheduler<L: BrowserLauncher, N: Notifier> {
    config: Config,
    context: WatchContext<L>,
    parser: Arc<RowParser>,
    dispatcher: NotificationDispatcher<N>,
    status: SharedStatus,
    announced: bool,
}

impl<L: BrowserLauncher, N: Notifier> ScanScheduler<L, N> {
    pub fn new(
        config: Config,
        context: WatchContext<L>,
        notifier: N,
        status: SharedStatus,
    ) -> Result<Self> {
        let parser = Arc::new(RowParser::new(&config.selectors)?);
        let dispatcher = NotificationDispatcher::new(notifier, config.target_url.clone());

        Ok(Self {
            config,
            context,
            parser,
            dispatcher,
            status,
            announced: false,
        })
    }

    pub fn context(&self) -> &WatchContext<L> {
        &self.context
    }

    pub fn status(&self) -> SharedStatus {
        Arc::clone(&self.status)
    }

    fn extractor(&self, browser: Arc<L::Browser>) -> FrameExtractor<L::Browser> {
        FrameExtractor::new(
            browser,
            Arc::clone(&self.parser),
            self.config.selectors.row.clone(),
            self.config.scan.extraction_timeout_ms,
        )
    }

    /// One scan cycle. Errors abort only this tick; tracker state is left
    /// untouched when extraction fails.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<TickOutcome> {
        let Some(handle) = self.context.session.ensure().await else {
            self.status.write().await.session_active = false;
            return Ok(TickOutcome::SessionUnavailable);
        };

        if handle.is_new() && !self.announced {
            self.announced = true;
            self.dispatcher.announce_start().await;
        }
        let browser = Arc::clone(handle.browser());

        if self.context.navigation.is_busy() {
            debug!("navigation in progress, dropping tick");
            return Ok(TickOutcome::Skipped);
        }

        if self
            .context
            .navigation
            .reload_due(now, self.config.scan.reload_interval_ms)
            .await
        {
            return self.reload(browser, now).await;
        }

        let snapshot = match self.extractor(Arc::clone(&browser)).snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.context.session.record_outcome(false);
                self.record_error(&e).await;
                return Err(e);
            }
        };

        if snapshot.is_empty() && self.context.navigation.empty_reload_allowed(now).await {
            info!("no rows visible, reloading page");
            return self.reload(browser, now).await;
        }

        let events = self.context.tracker.update(&snapshot.records);
        for event in &events {
            self.dispatcher.notify(event).await;
        }
        self.persist().await;
        self.context.session.record_outcome(true);

        {
            let mut status = self.status.write().await;
            status.last_scan_at = Some(now);
            status.last_error = None;
        }
        self.refresh_status().await;

        debug!(rows = snapshot.len(), events = events.len(), "scan complete");
        Ok(TickOutcome::Scanned {
            rows: snapshot.len(),
            events: events.len(),
        })
    }

    async fn reload(&mut self, browser: Arc<L::Browser>, now: DateTime<Utc>) -> Result<TickOutcome> {
        let result = self
            .context
            .navigation
            .navigate(browser.as_ref(), &self.config.target_url, now)
            .await;

        match result {
            Ok(NavigationOutcome::Skipped) => Ok(TickOutcome::Skipped),
            Ok(outcome) => {
                self.context.session.record_outcome(true);
                self.refresh_status().await;
                Ok(TickOutcome::Navigated(outcome))
            }
            Err(e) => {
                self.context.session.record_outcome(false);
                self.record_error(&e).await;
                self.refresh_status().await;
                Err(e)
            }
        }
    }

    async fn persist(&self) {
        if let Err(e) = self.context.store.save(self.context.tracker.orders()).await {
            warn!(path = %self.context.store.path().display(), error = %e, "could not persist state");
        }
    }

    async fn record_error(&self, error: &WatchError) {
        self.status.write().await.last_error = Some(error.to_string());
    }

    async fn refresh_status(&self) {
        let last_reload_at = self.context.navigation.last_reload_at().await;
        let mut status = self.status.write().await;
        status.last_reload_at = last_reload_at;
        status.session_active = self.context.session.is_active();
        status.tracked_orders = self.context.tracker.orders().len();
        status.open_positions = self.context.tracker.active_count();
    }

    pub async fn baseline(&mut self) -> Result<usize> {
        let browser = self
            .context
            .session
            .current()
            .ok_or(WatchError::NoActiveSession)?;
        let snapshot = self.extractor(browser).snapshot().await?;

        let count = self.context.tracker.baseline(&snapshot.records);
        self.persist().await;
        self.refresh_status().await;
        Ok(count)
    }

    pub async fn inspect(&self) -> Result<RowInspection> {
        let browser = self
            .context
            .session
            .current()
            .ok_or(WatchError::NoActiveSession)?;
        self.extractor(browser).inspect().await
    }

    async fn handle_command(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::Baseline { reply } => {
                let result = self.baseline().await;
                if let Err(e) = &result {
                    warn!(error = %e, "baseline failed");
                }
                let _ = reply.send(result);
            }
            ControlCommand::Inspect { reply } => {
                let _ = reply.send(self.inspect().await);
            }
        }
    }

    /// Drive ticks until `shutdown` resolves. Slow ticks delay the next one
    /// rather than queueing a burst.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<ControlCommand>,
        shutdown: impl Future<Output = ()>,
    ) {
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.scan.scan_interval_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(
            url = %self.config.target_url,
            scan_ms = self.config.scan.scan_interval_ms,
            reload_ms = self.config.scan.reload_interval_ms,
            "👀 watching positions"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }

                _ = interval.tick() => {
                    match self.tick(Utc::now()).await {
                        Ok(TickOutcome::Scanned { rows, events }) if events > 0 => {
                            info!(rows, events, "tick produced events");
                        }
                        Ok(outcome) => debug!(?outcome, "tick finished"),
                        Err(e) => warn!(kind = e.kind(), error = %e, "tick failed"),
                    }
                }

                Some(command) = commands.recv() => {
                    self.handle_command(command).await;
                }
            }
        }

        self.persist().await;
    }
}
