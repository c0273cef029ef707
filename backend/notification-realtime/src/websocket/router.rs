/// Message Router
///
/// Turns classified frames into effects:
/// - session termination and resource removal become [`SystemEvent`]s
///   (resource removal also raises a toast); neither touches the store
/// - user notifications go to the store (insert-if-absent) and raise a toast
/// - unread count syncs overwrite the store's counter
///
/// Protocol errors are logged and counted, never retried.
use super::messages::{classify, ClassifiedFrame, FrameError};
use crate::events::{EventBus, SystemEvent};
use crate::metrics;
use crate::models::{ChannelKind, Notification, NotificationType, Toast, ToastType};
use crate::services::{NotificationStore, ToastQueue};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    SessionTerminated,
    ResourceRemoved,
    NotificationInserted,
    DuplicateNotification,
    UnreadCountSynced(u64),
    Dropped(FrameError),
}

#[derive(Clone)]
pub struct MessageRouter {
    store: NotificationStore,
    toasts: ToastQueue,
    events: EventBus,
    toast_duration_ms: u64,
}

impl MessageRouter {
    pub fn new(
        store: NotificationStore,
        toasts: ToastQueue,
        events: EventBus,
        toast_duration_ms: u64,
    ) -> Self {
        Self {
            store,
            toasts,
            events,
            toast_duration_ms,
        }
    }

    /// Classify and dispatch one raw frame from `channel`
    pub async fn route(&self, channel: ChannelKind, raw: &str) -> RouteOutcome {
        let frame = match classify(raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(%channel, error = %e, "dropping push frame");
                metrics::record_dropped_frame(channel, e.reason());
                return RouteOutcome::Dropped(e);
            }
        };
        metrics::record_frame(channel, frame.kind());
        debug!(%channel, kind = frame.kind(), "push frame received");

        match frame {
            ClassifiedFrame::SessionTerminated { reason } => {
                info!(%channel, %reason, "session terminated by administrator");
                self.events.publish(SystemEvent::SessionTerminated { reason });
                RouteOutcome::SessionTerminated
            }
            ClassifiedFrame::ResourceRemoved {
                resource_type,
                resource_id,
                message,
            } => {
                info!(%channel, %resource_type, %resource_id, "resource removed");
                let toast = Toast::new(ToastType::Warning, removed_title(&resource_type), message.clone())
                    .with_duration_ms(self.toast_duration_ms);
                self.events.publish(SystemEvent::ResourceRemoved {
                    resource_type,
                    resource_id,
                    message,
                });
                self.toasts.show(toast).await;
                RouteOutcome::ResourceRemoved
            }
            ClassifiedFrame::UserNotification(notification) => {
                if self.deliver_notification(notification).await {
                    RouteOutcome::NotificationInserted
                } else {
                    RouteOutcome::DuplicateNotification
                }
            }
            ClassifiedFrame::UnreadCount(count) => {
                self.store.set_count(count).await;
                RouteOutcome::UnreadCountSynced(count)
            }
        }
    }

    /// Insert a notification (pushed or polled) and toast it if it was new
    pub async fn deliver_notification(&self, notification: Notification) -> bool {
        let toast = toast_for_notification(&notification, self.toast_duration_ms);
        let inserted = self.store.prepend(notification).await;
        if inserted {
            self.toasts.show(toast).await;
        }
        inserted
    }
}

fn removed_title(resource_type: &str) -> String {
    let mut chars = resource_type.chars();
    match chars.next() {
        Some(first) => format!("{}{} removed", first.to_uppercase(), chars.as_str()),
        None => "Removed".to_string(),
    }
}

/// Toast mirroring a notification, with a navigation action where one applies
pub fn toast_for_notification(notification: &Notification, duration_ms: u64) -> Toast {
    let toast_type = match notification.notification_type {
        NotificationType::JobMatch => ToastType::Success,
        NotificationType::AdminAction => ToastType::Warning,
        _ => ToastType::Info,
    };
    let toast = Toast::new(toast_type, &notification.title, &notification.content)
        .with_duration_ms(duration_ms);

    let action = match notification.notification_type {
        NotificationType::JobMatch => notification
            .metadata_str("jobId")
            .map(|id| ("View Job", format!("/jobs/{id}"))),
        NotificationType::ApplicationUpdate => notification
            .metadata_str("applicationId")
            .map(|id| ("View Application", format!("/applications/{id}"))),
        _ => None,
    };

    match action {
        Some((label, target)) => toast.with_action(label, target),
        None => toast,
    }
}
