pub mod dispatcher;
pub mod message;

pub use dispatcher::{NotificationDispatcher, Notifier, WebhookNotifier};
pub use message::{render_event, render_startup};
