pub mod api_client;
pub mod notification_store;
pub mod optimistic;
pub mod toast_queue;
pub mod view_analytics;

pub use api_client::{HttpNotificationApi, NotificationApi};
pub use notification_store::{NotificationSnapshot, NotificationStore};
pub use optimistic::{NotificationState, OptimisticCommand, StoreMutation};
pub use toast_queue::{ToastQueue, MAX_TOASTS};
pub use view_analytics::{InMemoryViewAnalytics, ViewAnalyticsCollector, ViewEvent, ViewStats};
