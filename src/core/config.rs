use crate::errors::{Result, WatchError};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub target_url: String,
    pub browser: BrowserConfig,
    pub selectors: SelectorConfig,
    pub navigation: NavigationConfig,
    pub scan: ScanConfig,
    pub notify: NotifyConfig,
    pub http: HttpConfig,
    pub state_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    pub headless: bool,
    pub viewport: Viewport,
    pub user_agent: Option<String>,
    pub chrome_path: Option<PathBuf>,
    pub args: Vec<String>,
    pub idle_timeout_secs: u64,
    /// Consecutive failed ticks after which the session is relaunched.
    pub max_consecutive_failures: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Where the position table lives in the upstream markup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    pub row: String,
    pub order_id: String,
    pub summary: String,
    pub avg_price: String,
    pub open_time: String,
    pub symbol_pattern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationConfig {
    pub page_load_timeout_ms: u64,
    pub content_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub empty_reload_cooldown_ms: u64,
    pub consent: ConsentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentConfig {
    pub selectors: Vec<String>,
    pub button_texts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    pub scan_interval_ms: u64,
    pub reload_interval_ms: u64,
    pub extraction_timeout_ms: u64,
    pub open_confirm_scans: u32,
    pub close_confirm_scans: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub webhook_url: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_url: String::new(),
            browser: BrowserConfig::default(),
            selectors: SelectorConfig::default(),
            navigation: NavigationConfig::default(),
            scan: ScanConfig::default(),
            notify: NotifyConfig::default(),
            http: HttpConfig::default(),
            state_file: PathBuf::from("state.json"),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport: Viewport::default(),
            user_agent: Some(
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123 Safari/537.36"
                    .to_string(),
            ),
            chrome_path: None,
            args: vec![
                "--disable-setuid-sandbox".to_string(),
                "--disable-gpu".to_string(),
                "--lang=fr-FR,fr".to_string(),
            ],
            idle_timeout_secs: 600,
            max_consecutive_failures: 20,
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1366,
            height: 768,
        }
    }
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            row: "tr.ant-table-row.ant-table-row-level-0".to_string(),
            order_id: "td:nth-child(9) .data".to_string(),
            summary: "td:nth-child(1)".to_string(),
            avg_price: "td:nth-child(4)".to_string(),
            open_time: "td:nth-child(8)".to_string(),
            symbol_pattern: "[A-Z]{2,}USDT".to_string(),
        }
    }
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            page_load_timeout_ms: 60_000,
            content_timeout_ms: 45_000,
            poll_interval_ms: 500,
            empty_reload_cooldown_ms: 10_000,
            consent: ConsentConfig::default(),
        }
    }
}

impl Default for ConsentConfig {
    fn default() -> Self {
        Self {
            selectors: vec![
                "#onetrust-accept-btn-handler".to_string(),
                "button[id*='accept']".to_string(),
                "[class*='cookie'] button".to_string(),
                "[class*='consent'] button".to_string(),
            ],
            button_texts: vec![
                "accept all".to_string(),
                "tout accepter".to_string(),
                "accept".to_string(),
                "accepter".to_string(),
                "i agree".to_string(),
                "got it".to_string(),
            ],
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            scan_interval_ms: 1500,
            reload_interval_ms: 15_000,
            extraction_timeout_ms: 10_000,
            open_confirm_scans: 1,
            close_confirm_scans: 3,
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            timeout_ms: 10_000,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        validate_http_url("target url", &self.target_url)?;
        validate_http_url("webhook url", &self.notify.webhook_url)?;

        if self.scan.open_confirm_scans == 0 || self.scan.close_confirm_scans == 0 {
            return Err(WatchError::ConfigurationError(
                "confirmation thresholds must be at least 1".to_string(),
            ));
        }

        let intervals = [
            ("scan interval", self.scan.scan_interval_ms),
            ("reload interval", self.scan.reload_interval_ms),
            ("extraction timeout", self.scan.extraction_timeout_ms),
            ("page load timeout", self.navigation.page_load_timeout_ms),
            ("content timeout", self.navigation.content_timeout_ms),
            ("poll interval", self.navigation.poll_interval_ms),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, value)| *value == 0) {
            return Err(WatchError::ConfigurationError(format!(
                "{} must be greater than zero",
                name
            )));
        }

        let selectors = [
            ("row selector", &self.selectors.row),
            ("order id selector", &self.selectors.order_id),
            ("summary selector", &self.selectors.summary),
            ("average price selector", &self.selectors.avg_price),
            ("open time selector", &self.selectors.open_time),
        ];
        if let Some((name, _)) = selectors.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(WatchError::ConfigurationError(format!("{} is empty", name)));
        }

        for warning in self.timing_warnings() {
            warn!("{}", warning);
        }

        Ok(())
    }

    /// Legal but questionable timing combinations.
    pub fn timing_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.scan.reload_interval_ms <= self.navigation.content_timeout_ms {
            warnings.push(format!(
                "reload interval {}ms does not exceed content timeout {}ms; a reload of an empty table outlasts the interval",
                self.scan.reload_interval_ms, self.navigation.content_timeout_ms
            ));
        }
        if self.navigation.empty_reload_cooldown_ms
            < self
                .scan
                .scan_interval_ms
                .saturating_mul(u64::from(self.scan.close_confirm_scans))
        {
            warnings.push(format!(
                "empty reload cooldown {}ms is shorter than {} scans; emptied tables may never close positions",
                self.navigation.empty_reload_cooldown_ms, self.scan.close_confirm_scans
            ));
        }
        warnings
    }
}

fn validate_http_url(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(WatchError::ConfigurationError(format!("{} is required", name)));
    }
    let parsed = url::Url::parse(value)
        .map_err(|e| WatchError::ConfigurationError(format!("{} is invalid: {}", name, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(WatchError::ConfigurationError(format!(
            "{} must use http or https, got {}",
            name, other
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Command line, with every flag also readable from the environment.
#[derive(Debug, Parser)]
#[command(name = "position-watch", version, about)]
pub struct CliArgs {
    /// Public page listing the positions to watch
    #[arg(long, env = "TRADER_URL")]
    pub trader_url: String,

    /// Webhook receiving open/close notifications
    #[arg(long, env = "DISCORD_WEBHOOK")]
    pub webhook_url: String,

    #[arg(long, env = "SCAN_EVERY_MS", default_value_t = 1500)]
    pub scan_every_ms: u64,

    #[arg(long, env = "RELOAD_EVERY_MS", default_value_t = 15_000)]
    pub reload_every_ms: u64,

    /// Consecutive sightings before a position counts as opened
    #[arg(long, env = "OPEN_CONFIRM_SCANS", default_value_t = 1)]
    pub open_confirm_scans: u32,

    /// Consecutive absences before a position counts as closed
    #[arg(long, env = "CLOSE_CONFIRM_SCANS", default_value_t = 3)]
    pub close_confirm_scans: u32,

    #[arg(long, env = "STATE_FILE", default_value = "state.json")]
    pub state_file: PathBuf,

    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0")]
    pub bind: String,

    #[arg(long, env = "CHROME_PATH")]
    pub chrome_path: Option<PathBuf>,

    /// Show the browser window
    #[arg(long, env = "HEADFUL")]
    pub headful: bool,

    #[arg(long, env = "ROW_SELECTOR")]
    pub row_selector: Option<String>,

    #[arg(long, env = "ORDER_ID_SELECTOR")]
    pub order_id_selector: Option<String>,

    #[arg(long, env = "SUMMARY_SELECTOR")]
    pub summary_selector: Option<String>,

    #[arg(long, env = "AVG_PRICE_SELECTOR")]
    pub avg_price_selector: Option<String>,

    #[arg(long, env = "OPEN_TIME_SELECTOR")]
    pub open_time_selector: Option<String>,

    #[arg(long, env = "PAGE_LOAD_TIMEOUT_MS", default_value_t = 60_000)]
    pub page_load_timeout_ms: u64,

    #[arg(long, env = "CONTENT_TIMEOUT_MS", default_value_t = 45_000)]
    pub content_timeout_ms: u64,

    #[arg(long, env = "EXTRACTION_TIMEOUT_MS", default_value_t = 10_000)]
    pub extraction_timeout_ms: u64,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

impl CliArgs {
    pub fn into_config(self) -> Result<Config> {
        let mut config = Config {
            target_url: self.trader_url,
            state_file: self.state_file,
            ..Config::default()
        };

        config.notify.webhook_url = self.webhook_url;
        config.scan.scan_interval_ms = self.scan_every_ms;
        config.scan.reload_interval_ms = self.reload_every_ms;
        config.scan.open_confirm_scans = self.open_confirm_scans;
        config.scan.close_confirm_scans = self.close_confirm_scans;
        config.scan.extraction_timeout_ms = self.extraction_timeout_ms;
        config.navigation.page_load_timeout_ms = self.page_load_timeout_ms;
        config.navigation.content_timeout_ms = self.content_timeout_ms;
        config.http.port = self.port;
        config.http.bind = self.bind;
        config.browser.headless = !self.headful;
        config.browser.chrome_path = self.chrome_path;

        let overrides = [
            (self.row_selector, &mut config.selectors.row),
            (self.order_id_selector, &mut config.selectors.order_id),
            (self.summary_selector, &mut config.selectors.summary),
            (self.avg_price_selector, &mut config.selectors.avg_price),
            (self.open_time_selector, &mut config.selectors.open_time),
        ];
        for (value, slot) in overrides {
            if let Some(value) = value {
                *slot = value;
            }
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Vec<&'static str> {
        vec![
            "position-watch",
            "--trader-url",
            "https://www.example.com/trader/42",
            "--webhook-url",
            "https://discord.example.com/api/webhooks/1/abc",
        ]
    }

    #[test]
    fn test_defaults_follow_watcher_conventions() {
        let config = CliArgs::try_parse_from(base_args())
            .unwrap()
            .into_config()
            .unwrap();
        assert_eq!(config.scan.scan_interval_ms, 1500);
        assert_eq!(config.scan.reload_interval_ms, 15_000);
        assert_eq!(config.scan.open_confirm_scans, 1);
        assert_eq!(config.scan.close_confirm_scans, 3);
        assert_eq!(config.state_file, PathBuf::from("state.json"));
        assert_eq!(config.http.port, 3000);
        assert!(config.browser.headless);
        assert_eq!(config.selectors.row, "tr.ant-table-row.ant-table-row-level-0");
    }

    #[test]
    fn test_overrides_apply() {
        let mut args = base_args();
        args.extend([
            "--open-confirm-scans",
            "2",
            "--row-selector",
            "div.position",
            "--headful",
        ]);
        let config = CliArgs::try_parse_from(args).unwrap().into_config().unwrap();
        assert_eq!(config.scan.open_confirm_scans, 2);
        assert_eq!(config.selectors.row, "div.position");
        assert_eq!(config.selectors.summary, "td:nth-child(1)");
        assert!(!config.browser.headless);
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let mut args = base_args();
        args.extend(["--close-confirm-scans", "0"]);
        let err = CliArgs::try_parse_from(args)
            .unwrap()
            .into_config()
            .unwrap_err();
        assert!(matches!(err, WatchError::ConfigurationError(_)));
    }

    #[test]
    fn test_non_http_url_rejected() {
        let mut config = Config::default();
        config.target_url = "ftp://example.com".to_string();
        config.notify.webhook_url = "https://example.com/hook".to_string();
        assert!(config.validate().is_err());

        config.target_url = "https://example.com".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_reload_interval_within_content_timeout_warns() {
        let mut config = Config::default();
        let warnings = config.timing_warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("reload interval 15000ms"));

        config.scan.reload_interval_ms = 60_000;
        assert!(config.timing_warnings().is_empty());

        config.navigation.empty_reload_cooldown_ms = 1_000;
        assert!(config.timing_warnings()[0].contains("cooldown"));
    }

    #[test]
    fn test_missing_required_values_rejected() {
        assert!(Config::default().validate().is_err());
        assert!(CliArgs::try_parse_from(["position-watch"]).is_err());
    }
}
