pub mod browser;
pub mod core;
pub mod dom;
pub mod errors;
pub mod logging;
pub mod notify;
pub mod scheduler;
pub mod server;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod tracker;
pub mod types;
pub mod utils;

pub use browser::{BrowserSession, NavigationController, NavigationOutcome};
pub use crate::core::{BrowserLauncher, BrowserTrait, Config, DomQuery, FrameRef};
pub use dom::{fallback_key, FrameExtractor, RowParser};
pub use errors::{Result, WatchError};
pub use notify::{NotificationDispatcher, Notifier, WebhookNotifier};
pub use scheduler::{ControlCommand, ScanScheduler, TickOutcome, WatchContext, WatchStatus};
pub use tracker::{LifecycleTracker, OrderState, StateStore, Thresholds};
pub use types::*;
