use crate::core::config::BrowserConfig;
use crate::core::BrowserTrait;
use crate::errors::Result;
use async_trait::async_trait;

/// Creates browser sessions on demand.
///
/// Launching can fail when no browser binary is installed; callers treat
/// that as a transient condition and try again later.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    type Browser: BrowserTrait;

    async fn launch(&self, config: &BrowserConfig) -> Result<Self::Browser>;
}
