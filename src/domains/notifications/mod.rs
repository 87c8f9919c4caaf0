pub mod dispatcher;
pub mod models;
pub mod service;

pub use dispatcher::{dispatcher_from_config, LogDispatcher, NotificationDispatcher, WebhookDispatcher};
pub use models::{NotificationLog, NotificationPayload, NotificationTarget, NotificationType};
pub use service::NotificationService;
