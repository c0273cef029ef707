/// Notification session
///
/// Wires the real-time pieces together for one authenticated session and
/// tears them down on logout. Everything here is owned by the session
/// instance; nothing survives it.
use crate::config::Config;
use crate::error::Result;
use crate::events::{EventBus, SystemEvent};
use crate::models::{ChannelKind, ConnectionState};
use crate::services::{
    HttpNotificationApi, NotificationApi, NotificationSnapshot, NotificationStore, ToastQueue,
    ViewAnalyticsCollector, ViewStats,
};
use crate::websocket::{
    ChannelOrchestrator, ChannelTransport, FrameHandler, MessageRouter, WebSocketTransport,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SessionIdentity {
    pub user_id: String,
    pub token: String,
    /// Evaluated once at establishment; not refreshed mid-session
    pub premium: bool,
}

/// External collaborators of a session
pub struct SessionDeps {
    pub api: Arc<dyn NotificationApi>,
    pub transport: Arc<dyn ChannelTransport>,
    pub analytics: Option<Arc<dyn ViewAnalyticsCollector>>,
}

impl SessionDeps {
    /// HTTP API and WebSocket channels as configured
    pub fn from_config(config: &Config, token: &str) -> Self {
        Self {
            api: Arc::new(HttpNotificationApi::new(
                config.api.base_url.clone(),
                token,
                config.request_timeout(),
            )),
            transport: Arc::new(WebSocketTransport::new(
                config.channels.admin_url.clone(),
                config.channels.notifications_url.clone(),
                token,
            )),
            analytics: None,
        }
    }

    pub fn with_analytics(mut self, analytics: Arc<dyn ViewAnalyticsCollector>) -> Self {
        self.analytics = Some(analytics);
        self
    }
}

/// Routes channel frames and schedules a catch-up fetch after each reconnect
struct SessionFrameHandler {
    router: MessageRouter,
    store: NotificationStore,
}

#[async_trait]
impl FrameHandler for SessionFrameHandler {
    async fn on_frame(&self, channel: ChannelKind, frame: String) {
        self.router.route(channel, &frame).await;
    }

    async fn on_reconnected(&self, channel: ChannelKind) {
        // The listener must not wait on REST calls
        let store = self.store.clone();
        tokio::spawn(async move {
            match store.load().await {
                Ok(()) => debug!(%channel, "catch-up fetch complete"),
                Err(e) => warn!(%channel, error = %e, "catch-up fetch failed"),
            }
        });
    }
}

pub struct NotificationSession {
    identity: SessionIdentity,
    store: NotificationStore,
    toasts: ToastQueue,
    events: EventBus,
    router: MessageRouter,
    orchestrator: ChannelOrchestrator,
    api: Arc<dyn NotificationApi>,
    analytics: Option<Arc<dyn ViewAnalyticsCollector>>,
    poll_interval: Option<Duration>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl NotificationSession {
    /// Build the session without touching the network. Subscribe to
    /// [`Self::events`] here if no event may be missed, then call [`Self::start`].
    pub fn new(identity: SessionIdentity, deps: SessionDeps, config: &Config) -> Self {
        let events = EventBus::new(config.session.event_bus_capacity);
        let store = NotificationStore::new(deps.api.clone());
        let toasts = ToastQueue::new(config.toast.max_toasts);
        let router = MessageRouter::new(
            store.clone(),
            toasts.clone(),
            events.clone(),
            config.toast.default_duration_ms,
        );
        let handler = Arc::new(SessionFrameHandler {
            router: router.clone(),
            store: store.clone(),
        });
        let orchestrator = ChannelOrchestrator::new(
            deps.transport,
            handler,
            events.clone(),
            config.reconnect.retry_config(),
        );

        Self {
            identity,
            store,
            toasts,
            events,
            router,
            orchestrator,
            api: deps.api,
            analytics: deps.analytics,
            poll_interval: config.match_poll_interval(),
            poller: Mutex::new(None),
        }
    }

    /// `new` followed by `start`
    pub async fn establish(identity: SessionIdentity, deps: SessionDeps, config: &Config) -> Self {
        let session = Self::new(identity, deps, config);
        session.start().await;
        session
    }

    /// Initial fetch, then channels. The admin channel is always opened; the
    /// notification channel only for premium sessions, which otherwise poll.
    pub async fn start(&self) {
        let user_id = self.identity.user_id.as_str();

        if let Err(e) = self.store.load().await {
            warn!(user_id, error = %e, "initial notification fetch failed");
        }

        self.orchestrator.connect(ChannelKind::AdminActions).await;

        if self.identity.premium {
            self.orchestrator.connect(ChannelKind::Notifications).await;
        } else if let Some(interval) = self.poll_interval {
            let mut poller = self.poller.lock().await;
            if poller.is_none() {
                *poller = Some(spawn_match_poller(
                    self.router.clone(),
                    self.api.clone(),
                    interval,
                ));
            }
        }

        info!(user_id, premium = self.identity.premium, "notification session established");
    }

    /// Disconnect both channels, stop polling, and drop all session state
    pub async fn logout(&self) {
        self.orchestrator.disconnect_all().await;
        if let Some(poller) = self.poller.lock().await.take() {
            poller.abort();
        }
        self.store.reset().await;
        self.toasts.clear().await;
        info!(user_id = %self.identity.user_id, "notification session closed");
    }

    /// One immediate match check; returns how many new notifications it added
    pub async fn poll_matches_once(&self) -> Result<usize> {
        poll_matches(&self.router, self.api.as_ref()).await
    }

    /// Profile view statistics for this user, when an analytics source is wired
    pub async fn profile_view_stats(&self) -> Result<Option<ViewStats>> {
        match &self.analytics {
            Some(analytics) => Ok(Some(analytics.get_stats(&self.identity.user_id).await?)),
            None => Ok(None),
        }
    }

    pub async fn refresh(&self) -> Result<()> {
        self.store.load().await
    }

    pub async fn mark_as_read(&self, id: &str) -> Result<()> {
        self.store.mark_as_read(id).await
    }

    pub async fn mark_all_as_read(&self) -> Result<()> {
        self.store.mark_all_as_read().await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.store.delete(id).await
    }

    pub async fn clear_all(&self) -> Result<()> {
        self.store.clear_all().await
    }

    pub async fn dismiss_toast(&self, id: &str) -> bool {
        self.toasts.dismiss(id).await
    }

    pub async fn snapshot(&self) -> NotificationSnapshot {
        self.store.snapshot().await
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    pub fn store(&self) -> &NotificationStore {
        &self.store
    }

    pub fn toasts(&self) -> &ToastQueue {
        &self.toasts
    }

    pub fn events(&self) -> broadcast::Receiver<SystemEvent> {
        self.events.subscribe()
    }

    pub fn connection_state(&self, channel: ChannelKind) -> ConnectionState {
        self.orchestrator.state(channel)
    }

    pub fn watch_connection(&self, channel: ChannelKind) -> watch::Receiver<ConnectionState> {
        self.orchestrator.watch(channel)
    }
}

impl Drop for NotificationSession {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.get_mut().take() {
            poller.abort();
        }
    }
}

async fn poll_matches(router: &MessageRouter, api: &dyn NotificationApi) -> Result<usize> {
    let matches = api.check_for_matches().await?;
    let mut inserted = 0;
    for notification in matches {
        if router.deliver_notification(notification).await {
            inserted += 1;
        }
    }
    Ok(inserted)
}

fn spawn_match_poller(
    router: MessageRouter,
    api: Arc<dyn NotificationApi>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately and the initial fetch already ran
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match poll_matches(&router, api.as_ref()).await {
                Ok(0) => debug!("match check found nothing new"),
                Ok(inserted) => info!(inserted, "match check delivered new notifications"),
                Err(e) => warn!(error = %e, "match check failed, retrying next tick"),
            }
        }
    })
}
