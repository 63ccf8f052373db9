#[cfg(feature = "chrome")]
pub mod chrome;
pub mod navigation;
pub mod session;

#[cfg(feature = "chrome")]
pub use chrome::{ChromeBrowser, ChromeLauncher};
pub use navigation::{NavigationController, NavigationOutcome};
pub use session::{BrowserSession, SessionHandle};
