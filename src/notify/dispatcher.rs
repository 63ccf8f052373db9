use crate::core::config::NotifyConfig;
use crate::errors::{Result, WatchError};
use crate::notify::message::{render_event, render_startup};
use crate::types::OrderEvent;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One outbound delivery attempt.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, content: &str) -> Result<()>;
}

/// Posts `{"content": ...}` to a webhook URL.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(config: &NotifyConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| WatchError::ConfigurationError(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            url: config.webhook_url.clone(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn deliver(&self, content: &str) -> Result<()> {
        let payload = serde_json::json!({ "content": content });

        // only transport failures count; the response is not inspected
        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| WatchError::DeliveryFailed(e.to_string()))?;

        debug!(status = %response.status(), "webhook answered");
        Ok(())
    }
}

/// Renders events and hands them to a [`Notifier`], at most once, no retry.
pub struct NotificationDispatcher<N: Notifier> {
    notifier: N,
    page_url: String,
}

impl<N: Notifier> NotificationDispatcher<N> {
    pub fn new(notifier: N, page_url: impl Into<String>) -> Self {
        Self {
            notifier,
            page_url: page_url.into(),
        }
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Returns whether delivery went through. A failed delivery is logged and
    /// the event is gone for good.
    pub async fn notify(&self, event: &OrderEvent) -> bool {
        let content = render_event(event, &self.page_url);
        match self.notifier.deliver(&content).await {
            Ok(()) => {
                info!(id = %event.order_id, kind = ?event.kind, "notification sent");
                true
            }
            Err(e) => {
                warn!(id = %event.order_id, kind = ?event.kind, error = %e, "notification lost");
                false
            }
        }
    }

    pub async fn announce_start(&self) -> bool {
        match self.notifier.deliver(&render_startup(&self.page_url)).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "startup notification lost");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingNotifier;
    use crate::types::{EventKind, Side};
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    fn opened(id: &str) -> OrderEvent {
        OrderEvent {
            kind: EventKind::Opened,
            order_id: id.to_string(),
            side: Side::Long,
            symbol: None,
            leverage: None,
            avg_price: None,
            open_time: None,
        }
    }

    #[tokio::test]
    async fn test_notify_delivers_rendered_message() {
        let notifier = RecordingNotifier::new();
        let dispatcher = NotificationDispatcher::new(notifier.clone(), "https://example.com");

        assert!(dispatcher.notify(&opened("A1")).await);
        let sent = notifier.messages();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("**A1**"));
    }

    #[tokio::test]
    async fn test_failed_delivery_is_swallowed_without_retry() {
        let notifier = RecordingNotifier::new();
        notifier.set_failing(true);
        let dispatcher = NotificationDispatcher::new(notifier.clone(), "https://example.com");

        assert!(!dispatcher.notify(&opened("A1")).await);
        assert_eq!(notifier.attempts(), 1);
        assert!(notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn test_webhook_posts_content_field() {
        let received: Arc<Mutex<Vec<serde_json::Value>>> = Arc::default();
        let sink = Arc::clone(&received);
        let app = Router::new().route(
            "/hook",
            post(move |Json(body): Json<serde_json::Value>| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().unwrap().push(body);
                    "ok"
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let notifier = WebhookNotifier::new(&NotifyConfig {
            webhook_url: format!("http://{}/hook", addr),
            timeout_ms: 2_000,
        })
        .unwrap();
        tokio_test::assert_ok!(notifier.deliver("hello").await);

        let bodies = received.lock().unwrap().clone();
        assert_eq!(bodies, vec![serde_json::json!({ "content": "hello" })]);
    }

    #[tokio::test]
    async fn test_webhook_transport_error_is_delivery_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let notifier = WebhookNotifier::new(&NotifyConfig {
            webhook_url: format!("http://{}/hook", addr),
            timeout_ms: 2_000,
        })
        .unwrap();
        let err = notifier.deliver("hello").await.unwrap_err();
        assert!(matches!(err, WatchError::DeliveryFailed(_)));
    }
}
