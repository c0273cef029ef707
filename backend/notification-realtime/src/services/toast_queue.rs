/// Toast Queue
///
/// Bounded queue of transient UI alerts, newest first. Each toast with a
/// non-zero duration gets its own expiry task; the task handle is owned by
/// the queue so dismissal, eviction and `clear` cancel it deterministically.
///
/// The queue never touches notification state and vice versa.
use crate::metrics;
use crate::models::Toast;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

pub const MAX_TOASTS: usize = 5;

#[derive(Default)]
struct ToastInner {
    toasts: VecDeque<Toast>,
    /// id -> (show sequence, expiry task)
    timers: HashMap<String, (u64, JoinHandle<()>)>,
    seq: u64,
}

impl ToastInner {
    fn cancel_timer(&mut self, id: &str) {
        if let Some((_, timer)) = self.timers.remove(id) {
            timer.abort();
        }
    }

    fn remove(&mut self, id: &str) -> bool {
        self.cancel_timer(id);
        let before = self.toasts.len();
        self.toasts.retain(|t| t.id.as_deref() != Some(id));
        self.toasts.len() != before
    }
}

#[derive(Clone)]
pub struct ToastQueue {
    inner: Arc<Mutex<ToastInner>>,
    max_toasts: usize,
}

impl ToastQueue {
    pub fn new(max_toasts: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ToastInner::default())),
            max_toasts: max_toasts.max(1),
        }
    }

    /// Show a toast and return its id. Evicts the oldest toasts beyond the cap.
    pub async fn show(&self, mut toast: Toast) -> String {
        let id = toast
            .id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone();
        let duration_ms = toast.duration_ms;

        let mut inner = self.inner.lock().await;

        // Re-showing an id replaces the previous toast and its timer
        inner.remove(&id);
        inner.toasts.push_front(toast);
        metrics::record_toast_event("shown");

        while inner.toasts.len() > self.max_toasts {
            if let Some(evicted) = inner.toasts.pop_back() {
                if let Some(evicted_id) = evicted.id.as_deref() {
                    inner.cancel_timer(evicted_id);
                    debug!(toast_id = evicted_id, "toast evicted");
                }
                metrics::record_toast_event("evicted");
            }
        }

        if duration_ms > 0 && inner.toasts.iter().any(|t| t.id.as_deref() == Some(id.as_str())) {
            inner.seq += 1;
            let seq = inner.seq;
            let queue = self.clone();
            let expiring_id = id.clone();
            let timer = tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(duration_ms)).await;
                queue.expire(&expiring_id, seq).await;
            });
            inner.timers.insert(id.clone(), (seq, timer));
        }

        id
    }

    /// Remove a toast immediately and cancel its timer
    pub async fn dismiss(&self, id: &str) -> bool {
        let removed = self.inner.lock().await.remove(id);
        if removed {
            metrics::record_toast_event("dismissed");
        }
        removed
    }

    /// Drop every toast and cancel all pending timers
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        for (_, (_, timer)) in inner.timers.drain() {
            timer.abort();
        }
        inner.toasts.clear();
    }

    /// Current toasts, newest first
    pub async fn toasts(&self) -> Vec<Toast> {
        self.inner.lock().await.toasts.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.toasts.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.toasts.is_empty()
    }

    async fn expire(&self, id: &str, seq: u64) {
        let mut inner = self.inner.lock().await;
        // A re-show under the same id owns a newer timer
        match inner.timers.get(id) {
            Some((current, _)) if *current == seq => {}
            _ => return,
        }
        // The timer being run is this task; forget it rather than abort ourselves
        inner.timers.remove(id);
        let before = inner.toasts.len();
        inner.toasts.retain(|t| t.id.as_deref() != Some(id));
        if inner.toasts.len() != before {
            metrics::record_toast_event("expired");
            debug!(toast_id = id, "toast expired");
        }
    }
}

impl Default for ToastQueue {
    fn default() -> Self {
        Self::new(MAX_TOASTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ToastType;

    fn toast(title: &str) -> Toast {
        Toast::new(ToastType::Info, title, "body")
    }

    #[tokio::test]
    async fn test_show_assigns_id_and_prepends() {
        let queue = ToastQueue::default();
        let first = queue.show(toast("first")).await;
        let second = queue.show(toast("second")).await;

        assert_ne!(first, second);
        let toasts = queue.toasts().await;
        assert_eq!(toasts[0].title, "second");
        assert_eq!(toasts[1].id.as_deref(), Some(first.as_str()));
    }

    #[tokio::test]
    async fn test_show_keeps_explicit_id() {
        let queue = ToastQueue::default();
        let id = queue.show(toast("x").with_id("fixed")).await;
        assert_eq!(id, "fixed");
    }

    #[tokio::test]
    async fn test_burst_is_capped_and_evicts_oldest() {
        let queue = ToastQueue::default();
        for i in 0..20 {
            queue.show(toast(&format!("t{i}")).with_duration_ms(60_000)).await;
            assert!(queue.len().await <= MAX_TOASTS);
        }

        let titles: Vec<_> = queue.toasts().await.into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["t19", "t18", "t17", "t16", "t15"]);
        assert_eq!(queue.inner.lock().await.timers.len(), MAX_TOASTS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_toast_expires_after_duration() {
        let queue = ToastQueue::default();
        queue.show(toast("short").with_duration_ms(3_000)).await;
        queue.show(toast("sticky")).await;

        tokio::time::sleep(Duration::from_millis(2_900)).await;
        assert_eq!(queue.len().await, 2);

        tokio::time::sleep(Duration::from_millis(200)).await;
        let toasts = queue.toasts().await;
        assert_eq!(toasts.len(), 1);
        assert_eq!(toasts[0].title, "sticky");
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismiss_cancels_timer() {
        let queue = ToastQueue::default();
        let id = queue.show(toast("gone").with_duration_ms(1_000)).await;

        assert!(queue.dismiss(&id).await);
        assert!(!queue.dismiss(&id).await);
        assert!(queue.inner.lock().await.timers.is_empty());

        tokio::time::sleep(Duration::from_millis(2_000)).await;
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_clear_drops_toasts_and_timers() {
        let queue = ToastQueue::default();
        queue.show(toast("a").with_duration_ms(10_000)).await;
        queue.show(toast("b")).await;

        queue.clear().await;

        assert!(queue.is_empty().await);
        assert!(queue.inner.lock().await.timers.is_empty());
    }
}
