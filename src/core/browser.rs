use crate::errors::Result;
use crate::utils::javascript::{self, JavaScriptRunner};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Address of a document inside the page: empty path is the top document,
/// `"0.2"` is the third child frame of the first frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRef {
    pub path: String,
}

impl FrameRef {
    pub fn main() -> Self {
        Self {
            path: String::new(),
        }
    }

    pub fn nested(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn is_main(&self) -> bool {
        self.path.is_empty()
    }
}

impl fmt::Display for FrameRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_main() {
            f.write_str("main")
        } else {
            write!(f, "frame[{}]", self.path)
        }
    }
}

/// Remote page primitives. Only `navigate` and `execute_script` touch the
/// driver; the frame-aware helpers default to in-page scripts.
#[async_trait]
pub trait BrowserTrait: Send + Sync + 'static {
    /// Load `url` in the page and wait for the document to settle.
    async fn navigate(&self, url: &str, timeout_ms: u64) -> Result<()>;

    /// Evaluate an expression in the top document.
    async fn execute_script(&self, script: &str) -> Result<Value>;

    /// Every reachable document, top document first.
    async fn frames(&self) -> Result<Vec<FrameRef>> {
        let value = self.execute_script(&javascript::frame_paths_script()).await?;
        let paths: Vec<String> = JavaScriptRunner::decode(value)?;
        Ok(paths.into_iter().map(FrameRef::nested).collect())
    }

    /// Outer HTML of every element matching `selector` in `frame`.
    async fn query_rows(&self, frame: &FrameRef, selector: &str) -> Result<Vec<String>> {
        let value = self
            .execute_script(&javascript::rows_html_script(&frame.path, selector))
            .await?;
        JavaScriptRunner::decode(value)
    }

    /// Click the first visible element matching `selector`; `Ok(false)` if none.
    async fn click_selector(&self, frame: &FrameRef, selector: &str) -> Result<bool> {
        let value = self
            .execute_script(&javascript::click_selector_script(&frame.path, selector))
            .await?;
        JavaScriptRunner::decode(value)
    }

    /// Click the first button whose text equals one of `texts` (case-insensitive).
    async fn click_text(&self, frame: &FrameRef, texts: &[String]) -> Result<bool> {
        let value = self
            .execute_script(&javascript::click_text_script(&frame.path, texts))
            .await?;
        JavaScriptRunner::decode(value)
    }

    /// Check if the underlying driver is still usable
    fn is_running(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_ref_display() {
        assert_eq!(FrameRef::main().to_string(), "main");
        assert_eq!(FrameRef::nested("0.1").to_string(), "frame[0.1]");
        assert!(FrameRef::nested("").is_main());
    }
}
