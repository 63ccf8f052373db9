//! In-memory stand-ins for the browser, the launcher and the webhook.

use crate::core::config::BrowserConfig;
use crate::core::{BrowserLauncher, BrowserTrait, FrameRef};
use crate::errors::{Result, WatchError};
use crate::notify::Notifier;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// A row in the shape the default selectors expect: summary in the first
/// cell, average price in the fourth, open time in the eighth and the order
/// id inside `.data` in the ninth.
pub fn order_row(id: &str, summary: &str, avg_price: &str, open_time: &str) -> String {
    format!(
        concat!(
            r#"<tr class="ant-table-row ant-table-row-level-0">"#,
            "<td>{}</td><td></td><td></td><td>{}</td><td></td><td></td><td></td><td>{}</td>",
            r#"<td><span class="data">{}</span></td></tr>"#
        ),
        summary, avg_price, open_time, id
    )
}

#[derive(Default)]
struct FakePage {
    frames: Vec<(String, Vec<String>)>,
    navigations: Vec<String>,
    clickable: Vec<String>,
    clicked: Vec<String>,
    fail_navigation: bool,
    fail_queries: bool,
    fail_clicks: bool,
    navigation_delay: Duration,
    query_delay: Duration,
}

/// Scripted page. Clones share state, so a test keeps one handle while the
/// code under test drives another.
#[derive(Clone)]
pub struct FakeBrowser {
    page: Arc<Mutex<FakePage>>,
    running: Arc<AtomicBool>,
}

impl Default for FakeBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self {
            page: Arc::default(),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    fn page(&self) -> MutexGuard<'_, FakePage> {
        self.page.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the rows rendered in the frame at `path` (`""` is the top document).
    pub fn set_frame_rows(&self, path: &str, rows: Vec<String>) {
        let mut page = self.page();
        match page.frames.iter_mut().find(|(p, _)| p == path) {
            Some((_, existing)) => *existing = rows,
            None => page.frames.push((path.to_string(), rows)),
        }
    }

    pub fn clear_rows(&self) {
        for (_, rows) in self.page().frames.iter_mut() {
            rows.clear();
        }
    }

    pub fn navigations(&self) -> Vec<String> {
        self.page().navigations.clone()
    }

    pub fn fail_navigation(&self, fail: bool) {
        self.page().fail_navigation = fail;
    }

    pub fn set_navigation_delay(&self, delay: Duration) {
        self.page().navigation_delay = delay;
    }

    /// Make `selector` match one clickable element until it is clicked.
    pub fn add_clickable(&self, selector: &str) {
        self.page().clickable.push(selector.to_string());
    }

    pub fn clicked(&self) -> Vec<String> {
        self.page().clicked.clone()
    }

    pub fn fail_clicks(&self, fail: bool) {
        self.page().fail_clicks = fail;
    }

    pub fn fail_queries(&self, fail: bool) {
        self.page().fail_queries = fail;
    }

    pub fn set_query_delay(&self, delay: Duration) {
        self.page().query_delay = delay;
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    fn take_click(&self, target: &str) -> Result<bool> {
        let mut page = self.page();
        if page.fail_clicks {
            return Err(WatchError::JavaScriptFailed("click rejected".to_string()));
        }
        match page.clickable.iter().position(|s| s == target) {
            Some(index) => {
                let target = page.clickable.remove(index);
                page.clicked.push(target);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl BrowserTrait for FakeBrowser {
    async fn navigate(&self, url: &str, _timeout_ms: u64) -> Result<()> {
        let (delay, fail) = {
            let mut page = self.page();
            page.navigations.push(url.to_string());
            (page.navigation_delay, page.fail_navigation)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(WatchError::NavigationFailed(format!("could not load {}", url)));
        }
        Ok(())
    }

    async fn execute_script(&self, _script: &str) -> Result<Value> {
        Err(WatchError::JavaScriptFailed(
            "fake browser does not evaluate scripts".to_string(),
        ))
    }

    async fn frames(&self) -> Result<Vec<FrameRef>> {
        let page = self.page();
        let mut frames = vec![FrameRef::main()];
        frames.extend(
            page.frames
                .iter()
                .filter(|(path, _)| !path.is_empty())
                .map(|(path, _)| FrameRef::nested(path.clone())),
        );
        Ok(frames)
    }

    async fn query_rows(&self, frame: &FrameRef, _selector: &str) -> Result<Vec<String>> {
        let (delay, fail, rows) = {
            let page = self.page();
            let rows = page
                .frames
                .iter()
                .find(|(path, _)| *path == frame.path)
                .map(|(_, rows)| rows.clone())
                .unwrap_or_default();
            (page.query_delay, page.fail_queries, rows)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(WatchError::JavaScriptFailed("frame detached".to_string()));
        }
        Ok(rows)
    }

    async fn click_selector(&self, _frame: &FrameRef, selector: &str) -> Result<bool> {
        self.take_click(selector)
    }

    async fn click_text(&self, _frame: &FrameRef, texts: &[String]) -> Result<bool> {
        for text in texts {
            if self.take_click(text)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Hands out clones of one [`FakeBrowser`], or fails while unavailable.
#[derive(Clone)]
pub struct FakeLauncher {
    browser: FakeBrowser,
    available: Arc<AtomicBool>,
    launches: Arc<AtomicUsize>,
}

impl FakeLauncher {
    pub fn new(browser: FakeBrowser) -> Self {
        Self {
            browser,
            available: Arc::new(AtomicBool::new(true)),
            launches: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    type Browser = FakeBrowser;

    async fn launch(&self, _config: &BrowserConfig) -> Result<FakeBrowser> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if !self.available.load(Ordering::SeqCst) {
            return Err(WatchError::SessionUnavailable(
                "no browser binary found".to_string(),
            ));
        }
        self.browser.set_running(true);
        Ok(self.browser.clone())
    }
}

/// Keeps every delivered message; can be switched to fail.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    messages: Arc<Mutex<Vec<String>>>,
    failing: Arc<AtomicBool>,
    attempts: Arc<AtomicUsize>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, content: &str) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(WatchError::DeliveryFailed("webhook unreachable".to_string()));
        }
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(content.to_string());
        Ok(())
    }
}
