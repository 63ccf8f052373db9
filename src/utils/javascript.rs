use crate::core::BrowserTrait;
use crate::errors::{Result, WatchError};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

pub struct JavaScriptRunner;

/// Shape every enveloped script returns, serialized to a JSON string so it
/// survives evaluation without `returnByValue`.
#[derive(Debug, Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    error: Option<String>,
}

impl JavaScriptRunner {
    pub async fn execute_with_timeout<B: BrowserTrait + ?Sized>(
        browser: &B,
        script: &str,
        timeout_ms: u64,
    ) -> Result<Value> {
        let execution = browser.execute_script(script);

        tokio::time::timeout(tokio::time::Duration::from_millis(timeout_ms), execution)
            .await
            .map_err(|_| WatchError::JavaScriptTimeout)?
    }

    pub async fn wait_for_condition<B: BrowserTrait + ?Sized>(
        browser: &B,
        condition: &str,
        timeout_ms: u64,
        poll_interval_ms: u64,
    ) -> Result<bool> {
        let start_time = std::time::Instant::now();
        let timeout = tokio::time::Duration::from_millis(timeout_ms);
        let poll_interval = tokio::time::Duration::from_millis(poll_interval_ms);

        while start_time.elapsed() < timeout {
            let remaining = timeout.saturating_sub(start_time.elapsed());
            let result = match Self::execute_with_timeout(
                browser,
                condition,
                remaining.as_millis() as u64,
            )
            .await
            {
                Ok(result) => result,
                Err(WatchError::JavaScriptTimeout) => break,
                Err(e) => return Err(e),
            };
            if let Some(true) = result.as_bool() {
                return Ok(true);
            }

            tokio::time::sleep(poll_interval).await;
        }

        Ok(false)
    }

    /// Unwraps the `{ok, value, error}` envelope produced by the script builders below.
    pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
        let envelope: Envelope = match value {
            Value::String(raw) => serde_json::from_str(&raw)?,
            Value::Null => {
                return Err(WatchError::JavaScriptFailed(
                    "script returned no value".to_string(),
                ))
            }
            other => serde_json::from_value(other)?,
        };

        if !envelope.ok {
            return Err(WatchError::JavaScriptFailed(
                envelope.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        Ok(serde_json::from_value(envelope.value)?)
    }
}

const RESOLVE_DOC: &str = r#"
    const resolveDoc = (path) => {
        let win = window;
        if (path) {
            for (const part of path.split('.')) {
                win = win.frames[Number(part)];
                if (!win) return null;
            }
        }
        return win.document;
    };
    const isVisible = (el) => !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length);
"#;

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

fn enveloped(body: &str) -> String {
    format!(
        r#"
        (function() {{
            try {{
                {}
                const value = (function() {{ {} }})();
                return JSON.stringify({{ ok: true, value: value }});
            }} catch (e) {{
                return JSON.stringify({{ ok: false, error: String(e && e.message || e) }});
            }}
        }})()
        "#,
        RESOLVE_DOC, body
    )
}

fn with_frame_doc(path: &str, body: &str) -> String {
    enveloped(&format!(
        r#"
        const doc = resolveDoc({path});
        if (!doc) throw new Error('frame ' + {path} + ' is gone');
        {body}
        "#,
        path = js_string(path),
        body = body
    ))
}

/// Paths of the top document and every same-origin nested frame.
pub fn frame_paths_script() -> String {
    enveloped(
        r#"
        const out = [''];
        const walk = (win, prefix) => {
            for (let i = 0; i < win.frames.length; i++) {
                const path = prefix === '' ? String(i) : prefix + '.' + i;
                try {
                    void win.frames[i].document.body;
                    out.push(path);
                    walk(win.frames[i], path);
                } catch (e) {
                    // cross-origin frame
                }
            }
        };
        walk(window, '');
        return out;
        "#,
    )
}

pub fn rows_html_script(path: &str, selector: &str) -> String {
    with_frame_doc(
        path,
        &format!(
            "return Array.from(doc.querySelectorAll({})).map((el) => el.outerHTML);",
            js_string(selector)
        ),
    )
}

pub fn click_selector_script(path: &str, selector: &str) -> String {
    with_frame_doc(
        path,
        &format!(
            r#"
            const target = Array.from(doc.querySelectorAll({})).find(isVisible);
            if (!target) return false;
            target.click();
            return true;
            "#,
            js_string(selector)
        ),
    )
}

pub fn click_text_script(path: &str, texts: &[String]) -> String {
    let wanted: Vec<String> = texts.iter().map(|t| t.trim().to_lowercase()).collect();
    let wanted = serde_json::to_string(&wanted).unwrap_or_else(|_| "[]".to_string());
    with_frame_doc(
        path,
        &format!(
            r#"
            const wanted = {};
            const candidates = Array.from(doc.querySelectorAll('button, [role="button"], a, input[type="button"], input[type="submit"]'));
            for (const text of wanted) {{
                const target = candidates.find((el) => {{
                    const label = (el.innerText || el.value || el.textContent || '').replace(/\s+/g, ' ').trim().toLowerCase();
                    return label === text && isVisible(el);
                }});
                if (target) {{
                    target.click();
                    return true;
                }}
            }}
            return false;
            "#,
            wanted
        ),
    )
}

pub const READY_STATE_COMPLETE: &str = "document.readyState === 'complete'";
