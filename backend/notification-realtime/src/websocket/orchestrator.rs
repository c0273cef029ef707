/// Channel Orchestrator
///
/// Owns the lifecycle of the two push channels of a session. Each connected
/// channel is served by one listener task that opens the transport, pumps
/// frames in arrival order to the [`FrameHandler`], and reconnects with
/// bounded backoff after transport failures.
///
/// State machine per channel:
///
/// ```text
/// IDLE -> CONNECTING -> CONNECTED -> ERROR -> RECONNECTING -> CONNECTED ...
///                                        \-> DISCONNECTED (cap exhausted)
/// any  -> DISCONNECTED (disconnect, or subscription rejected)
/// ```
use super::transport::ChannelTransport;
use crate::error::TransportError;
use crate::events::{EventBus, SystemEvent};
use crate::metrics;
use crate::models::{ChannelKind, ConnectionState};
use async_trait::async_trait;
use futures::StreamExt;
use resilience::{Backoff, RetryConfig};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Receives frames and lifecycle callbacks from listener tasks
#[async_trait]
pub trait FrameHandler: Send + Sync {
    async fn on_frame(&self, channel: ChannelKind, frame: String);

    /// Called after a channel came back from RECONNECTING. Pushes sent during
    /// the gap are not replayed, so implementations should schedule a catch-up.
    async fn on_reconnected(&self, channel: ChannelKind);
}

/// Transition gate shared between the orchestrator and one listener task.
///
/// The cancellation flag is checked while the watch value is locked, so once
/// `disconnect` has flipped it no listener write can land after DISCONNECTED.
#[derive(Clone)]
struct StateCell {
    channel: ChannelKind,
    sender: Arc<watch::Sender<ConnectionState>>,
    cancelled: Arc<AtomicBool>,
    events: EventBus,
}

impl StateCell {
    /// Returns false if the listener owning this cell was cancelled
    fn transition(&self, next: ConnectionState) -> bool {
        let mut accepted = false;
        self.sender.send_if_modified(|current| {
            if self.cancelled.load(Ordering::SeqCst) {
                return false;
            }
            accepted = true;
            self.apply(current, next)
        });
        accepted
    }

    /// Transition regardless of cancellation, used by explicit teardown
    fn force(&self, next: ConnectionState) {
        self.sender.send_if_modified(|current| self.apply(current, next));
    }

    fn apply(&self, current: &mut ConnectionState, next: ConnectionState) -> bool {
        if *current == next {
            return false;
        }
        info!(channel = %self.channel, from = %current, to = %next, "channel state changed");
        *current = next;
        metrics::set_connection_state(self.channel, next);
        self.events.publish(SystemEvent::ConnectionStateChanged {
            channel: self.channel,
            state: next,
        });
        true
    }
}

struct ChannelSlot {
    task: Option<JoinHandle<()>>,
    cancelled: Arc<AtomicBool>,
}

impl Default for ChannelSlot {
    fn default() -> Self {
        Self {
            task: None,
            cancelled: Arc::new(AtomicBool::new(true)),
        }
    }
}

pub struct ChannelOrchestrator {
    transport: Arc<dyn ChannelTransport>,
    handler: Arc<dyn FrameHandler>,
    events: EventBus,
    retry: RetryConfig,
    states: HashMap<ChannelKind, Arc<watch::Sender<ConnectionState>>>,
    slots: Mutex<HashMap<ChannelKind, ChannelSlot>>,
}

impl ChannelOrchestrator {
    pub fn new(
        transport: Arc<dyn ChannelTransport>,
        handler: Arc<dyn FrameHandler>,
        events: EventBus,
        retry: RetryConfig,
    ) -> Self {
        let states = ChannelKind::ALL
            .iter()
            .map(|channel| {
                let (sender, _) = watch::channel(ConnectionState::Idle);
                (*channel, Arc::new(sender))
            })
            .collect();
        let slots = ChannelKind::ALL
            .iter()
            .map(|channel| (*channel, ChannelSlot::default()))
            .collect();

        Self {
            transport,
            handler,
            events,
            retry,
            states,
            slots: Mutex::new(slots),
        }
    }

    /// Start the listener for `channel`. No-op while a listener is already alive.
    pub async fn connect(&self, channel: ChannelKind) {
        let mut slots = self.slots.lock().await;
        let slot = slots.entry(channel).or_default();

        let current = self.state(channel);
        if current.is_active() || current == ConnectionState::Error {
            debug!(%channel, state = %current, "connect ignored, listener already running");
            return;
        }
        if let Some(stale) = slot.task.take() {
            stale.abort();
        }

        let cell = StateCell {
            channel,
            sender: self.state_sender(channel),
            cancelled: Arc::new(AtomicBool::new(false)),
            events: self.events.clone(),
        };
        slot.cancelled = cell.cancelled.clone();
        cell.transition(ConnectionState::Connecting);

        let listener = Listener {
            cell,
            transport: self.transport.clone(),
            handler: self.handler.clone(),
            events: self.events.clone(),
            backoff: Backoff::new(self.retry.clone()),
        };
        slot.task = Some(tokio::spawn(listener.run()));
    }

    /// Tear down `channel`, cancelling its listener and any pending reconnect
    pub async fn disconnect(&self, channel: ChannelKind) {
        let mut slots = self.slots.lock().await;
        let slot = slots.entry(channel).or_default();

        slot.cancelled.store(true, Ordering::SeqCst);
        if let Some(task) = slot.task.take() {
            task.abort();
        }

        let cell = StateCell {
            channel,
            sender: self.state_sender(channel),
            cancelled: slot.cancelled.clone(),
            events: self.events.clone(),
        };
        if self.state(channel) != ConnectionState::Idle {
            cell.force(ConnectionState::Disconnected);
        }
    }

    pub async fn disconnect_all(&self) {
        for channel in ChannelKind::ALL {
            self.disconnect(channel).await;
        }
    }

    pub fn state(&self, channel: ChannelKind) -> ConnectionState {
        *self.state_sender(channel).borrow()
    }

    /// Observe state transitions of one channel
    pub fn watch(&self, channel: ChannelKind) -> watch::Receiver<ConnectionState> {
        self.state_sender(channel).subscribe()
    }

    fn state_sender(&self, channel: ChannelKind) -> Arc<watch::Sender<ConnectionState>> {
        // Populated for every ChannelKind in `new`
        self.states[&channel].clone()
    }
}

impl Drop for ChannelOrchestrator {
    fn drop(&mut self) {
        for slot in self.slots.get_mut().values_mut() {
            slot.cancelled.store(true, Ordering::SeqCst);
            if let Some(task) = slot.task.take() {
                task.abort();
            }
        }
    }
}

struct Listener {
    cell: StateCell,
    transport: Arc<dyn ChannelTransport>,
    handler: Arc<dyn FrameHandler>,
    events: EventBus,
    backoff: Backoff,
}

impl Listener {
    async fn run(mut self) {
        let channel = self.cell.channel;
        let mut connected_before = false;

        loop {
            match self.transport.open(channel).await {
                Ok(mut frames) => {
                    self.backoff.reset();
                    if !self.cell.transition(ConnectionState::Connected) {
                        return;
                    }
                    if connected_before {
                        info!(%channel, "channel reconnected, requesting catch-up");
                        self.handler.on_reconnected(channel).await;
                    }
                    connected_before = true;

                    while let Some(frame) = frames.next().await {
                        match frame {
                            Ok(text) => self.handler.on_frame(channel, text).await,
                            Err(TransportError::Subscription(reason)) => {
                                self.fail_permanently(&reason);
                                return;
                            }
                            Err(e) => {
                                warn!(%channel, error = %e, "push channel transport error");
                                break;
                            }
                        }
                    }
                    warn!(%channel, "push channel closed");
                }
                Err(TransportError::Subscription(reason)) => {
                    self.fail_permanently(&reason);
                    return;
                }
                Err(e) => {
                    warn!(%channel, error = %e, "failed to open push channel");
                }
            }

            if !self.cell.transition(ConnectionState::Error) {
                return;
            }

            match self.backoff.next_delay() {
                Some(delay) => {
                    if !self.cell.transition(ConnectionState::Reconnecting) {
                        return;
                    }
                    metrics::record_reconnect_attempt(channel);
                    warn!(
                        %channel,
                        attempt = self.backoff.attempts(),
                        max_attempts = self.backoff.max_retries(),
                        delay_ms = delay.as_millis() as u64,
                        "reconnecting push channel"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    let attempts = self.backoff.attempts();
                    error!(%channel, attempts, "reconnect attempts exhausted, live push unavailable");
                    self.events
                        .publish(SystemEvent::ChannelExhausted { channel, attempts });
                    self.cell.transition(ConnectionState::Disconnected);
                    return;
                }
            }
        }
    }

    fn fail_permanently(&self, reason: &str) {
        error!(channel = %self.cell.channel, %reason, "push channel subscription rejected, not retrying");
        self.cell.transition(ConnectionState::Disconnected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::transport::FrameStream;
    use futures::stream;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::mpsc;

    enum Script {
        Fail(TransportError),
        /// Frames, then either stay open or end (closure)
        Frames(Vec<&'static str>, bool),
    }

    #[derive(Default)]
    struct ScriptedTransport {
        scripts: std::sync::Mutex<VecDeque<Script>>,
        opens: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(scripts: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                scripts: std::sync::Mutex::new(scripts.into()),
                opens: AtomicUsize::new(0),
            })
        }

        fn opens(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChannelTransport for ScriptedTransport {
        async fn open(&self, _channel: ChannelKind) -> Result<FrameStream, TransportError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let next = self.scripts.lock().unwrap().pop_front();
            match next {
                Some(Script::Fail(e)) => Err(e),
                Some(Script::Frames(frames, stay_open)) => {
                    let frames = stream::iter(frames.into_iter().map(|f| Ok(f.to_string())));
                    if stay_open {
                        Ok(frames.chain(stream::pending()).boxed())
                    } else {
                        Ok(frames.boxed())
                    }
                }
                None => Err(TransportError::Transport("connection refused".into())),
            }
        }
    }

    #[derive(Debug, PartialEq)]
    enum Observed {
        Frame(String),
        Reconnected,
    }

    struct RecordingHandler {
        tx: mpsc::UnboundedSender<Observed>,
    }

    #[async_trait]
    impl FrameHandler for RecordingHandler {
        async fn on_frame(&self, _channel: ChannelKind, frame: String) {
            let _ = self.tx.send(Observed::Frame(frame));
        }

        async fn on_reconnected(&self, _channel: ChannelKind) {
            let _ = self.tx.send(Observed::Reconnected);
        }
    }

    fn retry(max_retries: u32, initial_ms: u64) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff: Duration::from_millis(initial_ms),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    fn orchestrator(
        transport: Arc<ScriptedTransport>,
        retry: RetryConfig,
    ) -> (ChannelOrchestrator, mpsc::UnboundedReceiver<Observed>, EventBus) {
        let (tx, rx) = mpsc::unbounded_channel();
        let events = EventBus::new(64);
        let orchestrator =
            ChannelOrchestrator::new(transport, Arc::new(RecordingHandler { tx }), events.clone(), retry);
        (orchestrator, rx, events)
    }

    fn state_events(rx: &mut tokio::sync::broadcast::Receiver<SystemEvent>) -> Vec<ConnectionState> {
        let mut states = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let SystemEvent::ConnectionStateChanged { state, .. } = event {
                states.push(state);
            }
        }
        states
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_are_delivered_in_order() {
        let transport = ScriptedTransport::new(vec![Script::Frames(vec!["a", "b", "c"], true)]);
        let (orchestrator, mut rx, _) = orchestrator(transport, retry(3, 100));

        orchestrator.connect(ChannelKind::Notifications).await;

        for expected in ["a", "b", "c"] {
            assert_eq!(rx.recv().await.unwrap(), Observed::Frame(expected.to_string()));
        }
        assert_eq!(orchestrator.state(ChannelKind::Notifications), ConnectionState::Connected);
        assert_eq!(orchestrator.state(ChannelKind::AdminActions), ConnectionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_is_idempotent() {
        let transport = ScriptedTransport::new(vec![Script::Frames(vec![], true)]);
        let (orchestrator, _rx, _) = orchestrator(transport.clone(), retry(3, 100));

        orchestrator.connect(ChannelKind::AdminActions).await;
        let mut state = orchestrator.watch(ChannelKind::AdminActions);
        state.wait_for(|s| *s == ConnectionState::Connected).await.unwrap();

        orchestrator.connect(ChannelKind::AdminActions).await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(transport.opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_requests_catch_up() {
        let transport = ScriptedTransport::new(vec![
            Script::Frames(vec!["before"], false),
            Script::Fail(TransportError::Transport("reset by peer".into())),
            Script::Frames(vec!["after"], true),
        ]);
        let (orchestrator, mut rx, events) = orchestrator(transport.clone(), retry(5, 100));
        let mut event_rx = events.subscribe();

        orchestrator.connect(ChannelKind::Notifications).await;

        assert_eq!(rx.recv().await.unwrap(), Observed::Frame("before".into()));
        assert_eq!(rx.recv().await.unwrap(), Observed::Reconnected);
        assert_eq!(rx.recv().await.unwrap(), Observed::Frame("after".into()));
        assert_eq!(transport.opens(), 3);

        use ConnectionState::*;
        assert_eq!(
            state_events(&mut event_rx),
            vec![Connecting, Connected, Error, Reconnecting, Error, Reconnecting, Connected]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_settle_disconnected() {
        let transport = ScriptedTransport::new(vec![]);
        let (orchestrator, _rx, events) = orchestrator(transport.clone(), retry(2, 100));
        let mut event_rx = events.subscribe();

        orchestrator.connect(ChannelKind::AdminActions).await;
        let mut state = orchestrator.watch(ChannelKind::AdminActions);
        state
            .wait_for(|s| *s == ConnectionState::Disconnected)
            .await
            .unwrap();

        // Initial attempt plus two retries
        assert_eq!(transport.opens(), 3);

        let mut exhausted = None;
        while let Ok(event) = event_rx.try_recv() {
            if let SystemEvent::ChannelExhausted { attempts, .. } = event {
                exhausted = Some(attempts);
            }
        }
        assert_eq!(exhausted, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscription_rejection_is_not_retried() {
        let transport = ScriptedTransport::new(vec![Script::Fail(TransportError::Subscription(
            "not entitled".into(),
        ))]);
        let (orchestrator, _rx, events) = orchestrator(transport.clone(), retry(5, 100));
        let mut event_rx = events.subscribe();

        orchestrator.connect(ChannelKind::Notifications).await;
        let mut state = orchestrator.watch(ChannelKind::Notifications);
        state
            .wait_for(|s| *s == ConnectionState::Disconnected)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(transport.opens(), 1);
        assert_eq!(
            state_events(&mut event_rx),
            vec![ConnectionState::Connecting, ConnectionState::Disconnected]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_pending_reconnect() {
        let transport = ScriptedTransport::new(vec![Script::Fail(TransportError::Transport(
            "timeout".into(),
        ))]);
        let (orchestrator, _rx, _) = orchestrator(transport.clone(), retry(5, 60_000));

        orchestrator.connect(ChannelKind::AdminActions).await;
        let mut state = orchestrator.watch(ChannelKind::AdminActions);
        state
            .wait_for(|s| *s == ConnectionState::Reconnecting)
            .await
            .unwrap();

        orchestrator.disconnect(ChannelKind::AdminActions).await;
        tokio::time::sleep(Duration::from_secs(300)).await;

        assert_eq!(orchestrator.state(ChannelKind::AdminActions), ConnectionState::Disconnected);
        assert_eq!(transport.opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_after_disconnect_starts_fresh_listener() {
        let transport = ScriptedTransport::new(vec![
            Script::Frames(vec![], true),
            Script::Frames(vec!["again"], true),
        ]);
        let (orchestrator, mut rx, _) = orchestrator(transport.clone(), retry(3, 100));

        orchestrator.connect(ChannelKind::AdminActions).await;
        let mut state = orchestrator.watch(ChannelKind::AdminActions);
        state.wait_for(|s| *s == ConnectionState::Connected).await.unwrap();

        orchestrator.disconnect_all().await;
        assert_eq!(orchestrator.state(ChannelKind::AdminActions), ConnectionState::Disconnected);
        // Never connected, so stays idle
        assert_eq!(orchestrator.state(ChannelKind::Notifications), ConnectionState::Idle);

        orchestrator.connect(ChannelKind::AdminActions).await;
        assert_eq!(rx.recv().await.unwrap(), Observed::Frame("again".into()));
        assert_eq!(transport.opens(), 2);
    }
}
