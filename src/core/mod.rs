pub mod browser;
pub mod config;
pub mod dom;
pub mod session;

pub use browser::{BrowserTrait, FrameRef};
pub use config::Config;
pub use dom::{DomQuery, RowInspection, Snapshot};
pub use session::BrowserLauncher;
