use crate::core::config::{ConsentConfig, NavigationConfig};
use crate::core::{BrowserTrait, FrameRef};
use crate::errors::{Result, WatchError};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// What a call to [`NavigationController::navigate`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// Another navigation held the guard; nothing was done.
    Skipped,
    Ready {
        frame: FrameRef,
        rows: usize,
        consent: Option<String>,
        duration_ms: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ConsentHeuristic {
    Selector(String),
    ButtonText(Vec<String>),
}

impl ConsentHeuristic {
    fn describe(&self) -> String {
        match self {
            ConsentHeuristic::Selector(selector) => format!("selector {}", selector),
            ConsentHeuristic::ButtonText(_) => "button text".to_string(),
        }
    }
}

fn consent_heuristics(config: &ConsentConfig) -> Vec<ConsentHeuristic> {
    let mut heuristics: Vec<ConsentHeuristic> = config
        .selectors
        .iter()
        .map(|s| ConsentHeuristic::Selector(s.clone()))
        .collect();
    if !config.button_texts.is_empty() {
        heuristics.push(ConsentHeuristic::ButtonText(config.button_texts.clone()));
    }
    heuristics
}

/// Released on drop, so every exit path of `navigate` frees the flag.
struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Serializes page loads against the shared session.
pub struct NavigationController {
    config: NavigationConfig,
    row_selector: String,
    busy: AtomicBool,
    last_reload_at: RwLock<Option<DateTime<Utc>>>,
}

impl NavigationController {
    pub fn new(config: NavigationConfig, row_selector: impl Into<String>) -> Self {
        Self {
            config,
            row_selector: row_selector.into(),
            busy: AtomicBool::new(false),
            last_reload_at: RwLock::new(None),
        }
    }

    fn try_acquire(&self) -> Option<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard { flag: &self.busy })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub async fn last_reload_at(&self) -> Option<DateTime<Utc>> {
        *self.last_reload_at.read().await
    }

    pub async fn mark_reload(&self, at: DateTime<Utc>) {
        *self.last_reload_at.write().await = Some(at);
    }

    pub async fn reload_due(&self, now: DateTime<Utc>, interval_ms: u64) -> bool {
        self.elapsed_at_least(now, interval_ms).await
    }

    /// Rate limit for reloads triggered by an empty table.
    pub async fn empty_reload_allowed(&self, now: DateTime<Utc>) -> bool {
        self.elapsed_at_least(now, self.config.empty_reload_cooldown_ms)
            .await
    }

    async fn elapsed_at_least(&self, now: DateTime<Utc>, ms: u64) -> bool {
        match *self.last_reload_at.read().await {
            None => true,
            Some(last) => now - last >= ChronoDuration::milliseconds(ms as i64),
        }
    }

    /// Single-flight page load: returns `Skipped` at once when another
    /// navigation is running. `started_at` is the caller's clock; the attempt
    /// is recorded when it finishes, whether it succeeded or not, so a slow
    /// failed load does not leave the next reload already due.
    pub async fn navigate<B: BrowserTrait + ?Sized>(
        &self,
        browser: &B,
        url: &str,
        started_at: DateTime<Utc>,
    ) -> Result<NavigationOutcome> {
        let Some(_guard) = self.try_acquire() else {
            debug!(url, "navigation already in progress, dropping request");
            return Ok(NavigationOutcome::Skipped);
        };

        let started = Instant::now();
        info!(url, "🚀 navigating");
        let result = self.load_and_wait(browser, url).await;

        let elapsed = started.elapsed();
        let finished_at =
            started_at + ChronoDuration::from_std(elapsed).unwrap_or_else(|_| ChronoDuration::zero());
        self.mark_reload(finished_at).await;

        let (frame, rows, consent) = result?;
        let duration_ms = elapsed.as_millis() as u64;
        info!(%frame, rows, duration_ms, "✅ page ready");
        Ok(NavigationOutcome::Ready {
            frame,
            rows,
            consent,
            duration_ms,
        })
    }

    async fn load_and_wait<B: BrowserTrait + ?Sized>(
        &self,
        browser: &B,
        url: &str,
    ) -> Result<(FrameRef, usize, Option<String>)> {
        let load_timeout = Duration::from_millis(self.config.page_load_timeout_ms);
        match tokio::time::timeout(
            load_timeout,
            browser.navigate(url, self.config.page_load_timeout_ms),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e @ WatchError::NavigationFailed(_))) => return Err(e),
            Ok(Err(e)) => return Err(WatchError::NavigationFailed(e.to_string())),
            Err(_) => {
                return Err(WatchError::NavigationFailed(format!(
                    "page load exceeded {}ms",
                    self.config.page_load_timeout_ms
                )))
            }
        }

        let consent = self.dismiss_consent(browser).await;
        let (frame, rows) = self.wait_for_rows(browser).await?;
        Ok((frame, rows, consent))
    }

    /// Best effort: the first heuristic that clicks something wins, errors are ignored.
    async fn dismiss_consent<B: BrowserTrait + ?Sized>(&self, browser: &B) -> Option<String> {
        let frames = match browser.frames().await {
            Ok(frames) => frames,
            Err(e) => {
                debug!(error = %e, "could not list frames for consent dismissal");
                vec![FrameRef::main()]
            }
        };

        for heuristic in consent_heuristics(&self.config.consent) {
            for frame in &frames {
                let attempt = match &heuristic {
                    ConsentHeuristic::Selector(selector) => {
                        browser.click_selector(frame, selector).await
                    }
                    ConsentHeuristic::ButtonText(texts) => browser.click_text(frame, texts).await,
                };
                match attempt {
                    Ok(true) => {
                        let name = heuristic.describe();
                        info!(%frame, heuristic = %name, "dismissed consent banner");
                        return Some(name);
                    }
                    Ok(false) => {}
                    Err(e) => debug!(%frame, error = %e, "consent heuristic failed"),
                }
            }
        }

        None
    }

    /// Polls every frame until one shows rows or the content timeout expires.
    async fn wait_for_rows<B: BrowserTrait + ?Sized>(&self, browser: &B) -> Result<(FrameRef, usize)> {
        let timeout = Duration::from_millis(self.config.content_timeout_ms);
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let start = Instant::now();
        let mut last_error = None;

        loop {
            match self.count_rows(browser).await {
                Ok(Some(found)) => return Ok(found),
                Ok(None) => {}
                Err(e) => last_error = Some(e.to_string()),
            }

            if start.elapsed() >= timeout {
                break;
            }
            tokio::time::sleep(poll_interval).await;
        }

        if let Some(error) = &last_error {
            warn!(error = %error, "last row check failed before timeout");
        }
        Err(WatchError::NavigationFailed(format!(
            "no frame showed rows matching {} within {}ms",
            self.row_selector, self.config.content_timeout_ms
        )))
    }

    async fn count_rows<B: BrowserTrait + ?Sized>(&self, browser: &B) -> Result<Option<(FrameRef, usize)>> {
        for frame in browser.frames().await? {
            let rows = browser.query_rows(&frame, &self.row_selector).await?;
            if !rows.is_empty() {
                return Ok(Some((frame, rows.len())));
            }
        }
        Ok(None)
    }
}
