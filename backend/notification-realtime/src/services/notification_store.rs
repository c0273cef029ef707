/// Notification Store
///
/// Owns the session's notification list and unread counter. All mutation
/// goes through the methods here; the inner lock is the serialization point
/// for push deliveries, fetches and user actions.
///
/// User actions are optimistic: the local change lands first, the remote
/// call follows, and a failure hands the recorded compensation back to the
/// state (see [`super::optimistic`]).
use super::api_client::NotificationApi;
use super::optimistic::{CompensationOutcome, NotificationState, StoreMutation};
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::Notification;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Read-only copy of the store for rendering
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationSnapshot {
    pub items: Vec<Notification>,
    pub unread_count: u64,
}

#[derive(Clone)]
pub struct NotificationStore {
    state: Arc<RwLock<NotificationState>>,
    api: Arc<dyn NotificationApi>,
}

impl NotificationStore {
    pub fn new(api: Arc<dyn NotificationApi>) -> Self {
        Self {
            state: Arc::new(RwLock::new(NotificationState::default())),
            api,
        }
    }

    /// Replace the list and counter with a fresh fetch
    pub async fn load(&self) -> Result<()> {
        let generation = self.state.read().await.generation();

        let page = self.api.fetch_notifications().await?;

        let count = page.items.len();
        let unread = page.unread_count;
        {
            let mut state = self.state.write().await;
            if state.generation() != generation {
                debug!("discarding notification fetch that raced a reset");
                return Ok(());
            }
            state.replace(page);
        }
        info!(count, unread, "notifications loaded");
        Ok(())
    }

    /// Pull the authoritative unread counter without refetching the list
    pub async fn refresh_unread_count(&self) -> Result<u64> {
        let count = self.api.fetch_unread_count().await?;
        self.set_count(count).await;
        Ok(count)
    }

    /// Insert a pushed or polled notification unless its id is already known
    pub async fn prepend(&self, notification: Notification) -> bool {
        let id = notification.id.clone();
        let inserted = self.state.write().await.insert_if_absent(notification);
        if inserted {
            debug!(notification_id = %id, "notification prepended");
        } else {
            debug!(notification_id = %id, "duplicate notification skipped");
        }
        inserted
    }

    /// Overwrite the unread counter with a server-reported value
    pub async fn set_count(&self, count: u64) {
        self.state.write().await.set_unread_count(count);
        debug!(count, "unread count synced");
    }

    pub async fn mark_as_read(&self, id: &str) -> Result<()> {
        let owned = id.to_string();
        self.run_optimistic(StoreMutation::MarkRead { id: owned.clone() }, move |api| async move {
            api.mark_read(&owned).await
        })
        .await
    }

    pub async fn mark_all_as_read(&self) -> Result<()> {
        self.run_optimistic(StoreMutation::MarkAllRead, |api| async move {
            api.mark_all_read().await
        })
        .await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let owned = id.to_string();
        self.run_optimistic(StoreMutation::Remove { id: owned.clone() }, move |api| async move {
            api.delete_notification(&owned).await
        })
        .await
    }

    pub async fn clear_all(&self) -> Result<()> {
        self.run_optimistic(StoreMutation::ClearAll, |api| async move {
            api.clear_all_notifications().await
        })
        .await
    }

    /// Drop all local state, e.g. on logout. In-flight rollbacks and fetches become no-ops.
    pub async fn reset(&self) {
        self.state.write().await.reset();
        info!("notification store cleared");
    }

    pub async fn snapshot(&self) -> NotificationSnapshot {
        let state = self.state.read().await;
        NotificationSnapshot {
            items: state.items().to_vec(),
            unread_count: state.unread_count(),
        }
    }

    pub async fn unread_count(&self) -> u64 {
        self.state.read().await.unread_count()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.is_empty()
    }

    pub async fn get(&self, id: &str) -> Option<Notification> {
        self.state.read().await.get(id).cloned()
    }

    async fn run_optimistic<F, Fut>(&self, mutation: StoreMutation, call: F) -> Result<()>
    where
        F: FnOnce(Arc<dyn NotificationApi>) -> Fut,
        Fut: Future<Output = std::result::Result<(), crate::error::ApiError>>,
    {
        let operation = mutation.operation();
        let command = self.state.write().await.apply(mutation);

        let err = match call(self.api.clone()).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        warn!(operation, error = %err, "optimistic update failed, compensating");
        let outcome = self.state.write().await.compensate(&command);
        match outcome {
            CompensationOutcome::Reverted => metrics::record_compensation(operation, "rollback"),
            CompensationOutcome::ResyncRequired => {
                metrics::record_compensation(operation, "resync");
                if let Err(resync_err) = self.load().await {
                    error!(operation, error = %resync_err, "resync after failed update also failed");
                }
            }
            CompensationOutcome::Stale => {
                debug!(operation, "state superseded before failure, nothing to undo")
            }
            CompensationOutcome::Noop => {}
        }

        Err(AppError::operation(operation, err))
    }
}
