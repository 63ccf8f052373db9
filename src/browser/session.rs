use crate::core::config::BrowserConfig;
use crate::core::{BrowserLauncher, BrowserTrait};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

struct ActiveSession<B> {
    browser: Arc<B>,
    session_id: String,
    started_at: DateTime<Utc>,
}

/// Result of [`BrowserSession::ensure`].
pub enum SessionHandle<B> {
    /// A browser was launched during this call.
    Launched(Arc<B>),
    Existing(Arc<B>),
}

impl<B> SessionHandle<B> {
    pub fn browser(&self) -> &Arc<B> {
        match self {
            SessionHandle::Launched(browser) | SessionHandle::Existing(browser) => browser,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, SessionHandle::Launched(_))
    }
}

/// Lazily created browser session, shared by navigation and extraction.
pub struct BrowserSession<L: BrowserLauncher> {
    launcher: L,
    config: BrowserConfig,
    active: Option<ActiveSession<L::Browser>>,
    consecutive_failures: u32,
    launch_attempts: u64,
}

impl<L: BrowserLauncher> BrowserSession<L> {
    pub fn new(launcher: L, config: BrowserConfig) -> Self {
        Self {
            launcher,
            config,
            active: None,
            consecutive_failures: 0,
            launch_attempts: 0,
        }
    }

    /// Returns the live browser, launching one if needed. `None` means the
    /// browser could not be started; the next call tries again.
    pub async fn ensure(&mut self) -> Option<SessionHandle<L::Browser>> {
        if let Some(active) = &self.active {
            if active.browser.is_running() {
                return Some(SessionHandle::Existing(Arc::clone(&active.browser)));
            }
            warn!(session_id = %active.session_id, "browser stopped responding, relaunching");
            self.active = None;
        }

        self.launch_attempts += 1;
        match self.launcher.launch(&self.config).await {
            Ok(browser) => {
                let browser = Arc::new(browser);
                let session_id = uuid::Uuid::new_v4().to_string();
                info!(%session_id, "🌐 browser session started");
                self.active = Some(ActiveSession {
                    browser: Arc::clone(&browser),
                    session_id,
                    started_at: Utc::now(),
                });
                self.consecutive_failures = 0;
                Some(SessionHandle::Launched(browser))
            }
            Err(e) => {
                warn!(error = %e, attempt = self.launch_attempts, "browser session unavailable");
                None
            }
        }
    }

    /// Feed back whether the tick that used the session succeeded. A long
    /// failure streak drops the session so the next tick relaunches.
    pub fn record_outcome(&mut self, success: bool) {
        if success {
            self.consecutive_failures = 0;
            return;
        }

        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.config.max_consecutive_failures {
            if let Some(active) = self.active.take() {
                warn!(
                    session_id = %active.session_id,
                    failures = self.consecutive_failures,
                    "dropping browser session after repeated failures"
                );
            }
            self.consecutive_failures = 0;
        }
    }

    pub fn current(&self) -> Option<Arc<L::Browser>> {
        self.active.as_ref().map(|a| Arc::clone(&a.browser))
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.session_id.as_str())
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.active.as_ref().map(|a| a.started_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBrowser, FakeLauncher};

    fn config(max_failures: u32) -> BrowserConfig {
        BrowserConfig {
            max_consecutive_failures: max_failures,
            ..BrowserConfig::default()
        }
    }

    #[tokio::test]
    async fn test_ensure_launches_once() {
        let launcher = FakeLauncher::new(FakeBrowser::new());
        let mut session = BrowserSession::new(launcher.clone(), config(5));

        let first = session.ensure().await.unwrap();
        assert!(first.is_new());
        let second = session.ensure().await.unwrap();
        assert!(!second.is_new());
        assert_eq!(launcher.launch_count(), 1);
        assert!(session.session_id().is_some());
    }

    #[tokio::test]
    async fn test_unavailable_browser_is_retried_each_call() {
        let launcher = FakeLauncher::new(FakeBrowser::new());
        launcher.set_available(false);
        let mut session = BrowserSession::new(launcher.clone(), config(5));

        assert!(session.ensure().await.is_none());
        assert!(session.ensure().await.is_none());
        assert!(!session.is_active());
        assert_eq!(launcher.launch_count(), 2);

        launcher.set_available(true);
        assert!(session.ensure().await.unwrap().is_new());
    }

    #[tokio::test]
    async fn test_failure_streak_drops_session() {
        let launcher = FakeLauncher::new(FakeBrowser::new());
        let mut session = BrowserSession::new(launcher.clone(), config(3));
        session.ensure().await.unwrap();

        session.record_outcome(false);
        session.record_outcome(false);
        session.record_outcome(true);
        session.record_outcome(false);
        session.record_outcome(false);
        assert!(session.is_active());

        session.record_outcome(false);
        assert!(!session.is_active());
        assert!(session.ensure().await.unwrap().is_new());
        assert_eq!(launcher.launch_count(), 2);
    }

    #[tokio::test]
    async fn test_stopped_browser_is_relaunched() {
        let browser = FakeBrowser::new();
        let launcher = FakeLauncher::new(browser.clone());
        let mut session = BrowserSession::new(launcher.clone(), config(5));
        session.ensure().await.unwrap();

        browser.set_running(false);
        let handle = session.ensure().await.unwrap();
        assert!(handle.is_new());
    }
}
