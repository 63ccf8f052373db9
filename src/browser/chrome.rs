use crate::core::config::BrowserConfig;
use crate::core::{BrowserLauncher, BrowserTrait};
use crate::errors::{Result, WatchError};
use crate::utils::javascript::{JavaScriptRunner, READY_STATE_COMPLETE};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;
use std::ffi::OsStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Chrome browser implementation
pub struct ChromeBrowser {
    // kept alive for as long as the tab is used
    _browser: Browser,
    tab: Arc<Tab>,
    running: AtomicBool,
}

impl ChromeBrowser {
    fn launch_blocking(config: &BrowserConfig) -> Result<Self> {
        let window_size_arg = format!(
            "--window-size={},{}",
            config.viewport.width, config.viewport.height
        );

        let user_agent_arg = config
            .user_agent
            .as_ref()
            .map(|ua| format!("--user-agent={}", ua));

        let mut args = vec![
            OsStr::new("--no-sandbox"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new(&window_size_arg),
        ];

        if let Some(ref ua_arg) = user_agent_arg {
            args.push(OsStr::new(ua_arg));
        }

        for arg in &config.args {
            args.push(OsStr::new(arg));
        }

        let launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .path(config.chrome_path.clone())
            .idle_browser_timeout(Duration::from_secs(config.idle_timeout_secs))
            .args(args)
            .build()
            .map_err(|e| WatchError::SessionUnavailable(e.to_string()))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| WatchError::SessionUnavailable(e.to_string()))?;

        let tab = browser
            .new_tab()
            .map_err(|e| WatchError::SessionUnavailable(e.to_string()))?;

        Ok(Self {
            _browser: browser,
            tab,
            running: AtomicBool::new(true),
        })
    }

    /// headless_chrome blocks on every call; keep that off the scheduler thread.
    async fn on_tab<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> anyhow::Result<T> + Send + 'static,
    {
        let tab = Arc::clone(&self.tab);
        let outcome = tokio::task::spawn_blocking(move || op(&tab))
            .await
            .map_err(WatchError::from_any_error)?;

        outcome.map_err(|e| {
            let message = e.to_string();
            if message.to_lowercase().contains("connection") {
                self.running.store(false, Ordering::Release);
            }
            WatchError::ChromeError(message)
        })
    }
}

#[async_trait]
impl BrowserTrait for ChromeBrowser {
    async fn navigate(&self, url: &str, timeout_ms: u64) -> Result<()> {
        let url = url.to_string();
        let timeout = Duration::from_millis(timeout_ms);

        self.on_tab(move |tab| {
            tab.set_default_timeout(timeout);
            tab.navigate_to(&url)?;
            tab.wait_until_navigated()?;
            Ok(())
        })
        .await
        .map_err(|e| WatchError::NavigationFailed(e.to_string()))?;

        let settled =
            JavaScriptRunner::wait_for_condition(self, READY_STATE_COMPLETE, timeout_ms, 250)
                .await?;
        if !settled {
            debug!("document never reached readyState=complete, continuing");
        }

        Ok(())
    }

    async fn execute_script(&self, script: &str) -> Result<Value> {
        let script = script.to_string();
        self.on_tab(move |tab| {
            let result = tab.evaluate(&script, false)?;
            Ok(result.value.unwrap_or(Value::Null))
        })
        .await
        .map_err(|e| WatchError::JavaScriptFailed(e.to_string()))
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Launches one headless Chrome with a single tab per session.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChromeLauncher;

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    type Browser = ChromeBrowser;

    async fn launch(&self, config: &BrowserConfig) -> Result<ChromeBrowser> {
        let config = config.clone();
        tokio::task::spawn_blocking(move || ChromeBrowser::launch_blocking(&config))
            .await
            .map_err(|e| WatchError::SessionUnavailable(e.to_string()))?
    }
}
