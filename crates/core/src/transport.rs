use crate::call_transport::CallTransport;
use crate::call_types::{CallHandle, CallTarget, ConnectionHealth, StartOptions, TransportEvent};
use crate::config::SessionConfig;
use crate::error::{SessionError, is_permission_denial};
use crate::notify::{Notifier, NotifyKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

const EVENT_CAPACITY: usize = 256;

/// Decides which transport error messages are expected churn.
///
/// WebRTC stacks report every ICE hiccup as an error; those are logged at
/// `debug` so real failures stand out at `error`.
#[derive(Debug, Clone)]
pub struct LogFilterPolicy {
    noise: Vec<String>,
}

impl Default for LogFilterPolicy {
    fn default() -> Self {
        Self::new([
            "transport changed to disconnected",
            "transport changed to failed",
            "ICE connection state changed to disconnected",
            "ICE connection state changed to failed",
        ])
    }
}

impl LogFilterPolicy {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            noise: patterns
                .into_iter()
                .map(|p| p.into().to_lowercase())
                .collect(),
        }
    }

    pub fn is_noise(&self, message: &str) -> bool {
        let message = message.to_lowercase();
        self.noise.iter().any(|pattern| message.contains(pattern))
    }

    pub fn log_error(&self, context: &str, message: &str) {
        if self.is_noise(message) {
            tracing::debug!(context, "{message}");
        } else {
            tracing::error!(context, "{message}");
        }
    }
}

/// A live registration for transport events. Dropping it, or calling
/// `unsubscribe`, stops delivery.
pub struct Subscription {
    rx: Option<broadcast::Receiver<TransportEvent>>,
}

impl Subscription {
    /// Waits for the next event. Returns `None` once unsubscribed or when the
    /// adapter is gone.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        loop {
            let rx = self.rx.as_mut()?;
            match rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "transport subscriber lagged, events dropped");
                }
                Err(RecvError::Closed) => {
                    self.rx = None;
                    return None;
                }
            }
        }
    }

    pub fn unsubscribe(&mut self) {
        self.rx.take();
    }

    pub fn is_active(&self) -> bool {
        self.rx.is_some()
    }
}

/// Wraps a `CallTransport` with bounded start retries and synthesised
/// `ConnectionFailed` events.
///
/// Must be created inside a tokio runtime: construction spawns the tasks that
/// relay SDK events and watch connection states.
pub struct TransportAdapter<T: CallTransport> {
    transport: T,
    config: SessionConfig,
    notifier: Arc<dyn Notifier>,
    events: broadcast::Sender<TransportEvent>,
    health: Arc<Mutex<ConnectionHealth>>,
    reconnecting: Arc<AtomicBool>,
    retry_count: u32,
    relay: Option<JoinHandle<()>>,
    monitor: Option<JoinHandle<()>>,
}

impl<T: CallTransport> TransportAdapter<T> {
    pub fn new(
        transport: T,
        config: SessionConfig,
        log_policy: LogFilterPolicy,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let health = Arc::new(Mutex::new(ConnectionHealth::default()));
        let reconnecting = Arc::new(AtomicBool::new(false));

        let relay = Self::spawn_relay(transport.subscribe(), events.clone(), log_policy);
        let monitor = transport.connection_states().map(|states| {
            Self::spawn_monitor(states, events.clone(), health.clone(), reconnecting.clone())
        });
        if monitor.is_none() {
            tracing::debug!("transport exposes no connection states; failure detection disabled");
        }

        Self {
            transport,
            config,
            notifier,
            events,
            health,
            reconnecting,
            retry_count: 0,
            relay: Some(relay),
            monitor,
        }
    }

    fn spawn_relay(
        mut source: broadcast::Receiver<TransportEvent>,
        events: broadcast::Sender<TransportEvent>,
        log_policy: LogFilterPolicy,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match source.recv().await {
                    Ok(event) => {
                        if let TransportEvent::Error(message) = &event {
                            log_policy.log_error("transport", message);
                        }
                        // No subscribers is fine: nobody is listening yet.
                        let _ = events.send(event);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "transport relay lagged, events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!("transport event stream closed");
        })
    }

    // Emits one `ConnectionFailed` per failure episode. An episode ends when
    // neither side reports `failed` any more.
    fn spawn_monitor(
        mut states: tokio::sync::watch::Receiver<ConnectionHealth>,
        events: broadcast::Sender<TransportEvent>,
        health: Arc<Mutex<ConnectionHealth>>,
        reconnecting: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut latched = false;
            loop {
                let current = *states.borrow_and_update();
                *health.lock().unwrap_or_else(PoisonError::into_inner) = current;
                tracing::debug!(transport = ?current.transport, media = ?current.media, "connection state changed");

                if current.is_failed() {
                    if !latched && !reconnecting.load(Ordering::SeqCst) {
                        latched = true;
                        tracing::warn!("connection failed");
                        let _ = events.send(TransportEvent::ConnectionFailed);
                    }
                } else {
                    latched = false;
                }

                if states.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    /// Starts a call, retrying transient failures with capped exponential
    /// backoff. A denied device permission fails immediately.
    pub async fn start(
        &mut self,
        target: &CallTarget,
        options: &StartOptions,
    ) -> Result<CallHandle, SessionError> {
        let max_retries = self.config.max_start_retries;
        self.retry_count = 0;
        let mut last_error = String::new();

        for attempt in 0..=max_retries {
            if attempt > 0 {
                self.retry_count = attempt;
                self.reconnecting.store(true, Ordering::SeqCst);
                self.notifier.notify(
                    NotifyKind::Info,
                    &format!("Connection failed. Retrying... ({attempt}/{max_retries})"),
                );
                tokio::time::sleep(self.config.retry_delay(attempt)).await;
            }

            tracing::info!(target = target.id(), attempt, "starting call");
            match self.transport.start(target, options).await {
                Ok(handle) => {
                    self.reconnecting.store(false, Ordering::SeqCst);
                    return Ok(handle);
                }
                Err(err) => {
                    let reason = format!("{err:#}");
                    if is_permission_denial(&reason) {
                        tracing::warn!(%reason, "call start refused: permission denied");
                        self.reconnecting.store(false, Ordering::SeqCst);
                        return Err(SessionError::PermissionDenied(reason));
                    }
                    tracing::warn!(attempt, %reason, "call start failed");
                    last_error = reason;
                }
            }
        }

        self.reconnecting.store(false, Ordering::SeqCst);
        Err(SessionError::TransportStart {
            attempts: max_retries + 1,
            message: last_error,
        })
    }

    pub async fn stop(&mut self) {
        if let Err(err) = self.transport.stop().await {
            tracing::warn!("failed to stop call: {err:#}");
        }
        self.reconnecting.store(false, Ordering::SeqCst);
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: Some(self.events.subscribe()),
        }
    }

    pub fn connection_health(&self) -> ConnectionHealth {
        *self.health.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Retries performed by the most recent `start`.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn is_reconnecting(&self) -> bool {
        self.reconnecting.load(Ordering::SeqCst)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl<T: CallTransport> Drop for TransportAdapter<T> {
    fn drop(&mut self) {
        if let Some(relay) = self.relay.take() {
            relay.abort();
        }
        if let Some(monitor) = self.monitor.take() {
            monitor.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_transport::MockCallTransport;
    use crate::call_types::PeerState;
    use crate::notify::testing::RecordingNotifier;
    use std::time::Duration;
    use tokio::sync::watch;
    use tokio::time::Instant;

    fn mock_transport(events: &broadcast::Sender<TransportEvent>) -> MockCallTransport {
        let mut transport = MockCallTransport::new();
        let events = events.clone();
        transport
            .expect_subscribe()
            .returning(move || events.subscribe());
        transport.expect_connection_states().returning(|| None);
        transport
    }

    fn target() -> CallTarget {
        CallTarget::Workflow("wf-1".into())
    }

    #[test]
    fn classifies_ice_churn_as_noise() {
        let policy = LogFilterPolicy::default();
        assert!(policy.is_noise("ICE connection state changed to failed"));
        assert!(policy.is_noise("daily-js: Transport changed to disconnected"));
        assert!(!policy.is_noise("Meeting has ended"));
    }

    #[tokio::test]
    async fn permission_denial_is_not_retried() {
        // --- Arrange ---
        let (events, _) = broadcast::channel(8);
        let mut transport = mock_transport(&events);
        transport
            .expect_start()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("NotAllowedError: Permission denied")));
        let notifier = Arc::new(RecordingNotifier::default());
        let mut adapter = TransportAdapter::new(
            transport,
            SessionConfig::default(),
            LogFilterPolicy::default(),
            notifier.clone(),
        );

        // --- Act ---
        let result = adapter.start(&target(), &StartOptions::default()).await;

        // --- Assert ---
        assert!(matches!(result, Err(SessionError::PermissionDenied(_))));
        assert_eq!(adapter.retry_count(), 0);
        assert!(notifier.all().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn retries_with_backoff_until_the_call_starts() {
        // --- Arrange ---
        let (events, _) = broadcast::channel(8);
        let mut transport = mock_transport(&events);
        let mut calls = 0;
        transport.expect_start().times(3).returning(move |_, _| {
            calls += 1;
            if calls <= 2 {
                Err(anyhow::anyhow!("network timeout"))
            } else {
                Ok(CallHandle { id: "call-1".into() })
            }
        });
        let notifier = Arc::new(RecordingNotifier::default());
        let mut adapter = TransportAdapter::new(
            transport,
            SessionConfig::default(),
            LogFilterPolicy::default(),
            notifier.clone(),
        );
        let started = Instant::now();

        // --- Act ---
        let handle = adapter
            .start(&target(), &StartOptions::default())
            .await
            .unwrap();

        // --- Assert ---
        assert_eq!(handle.id, "call-1");
        assert_eq!(adapter.retry_count(), 2);
        assert!(!adapter.is_reconnecting());
        // 2s before the first retry, 4s before the second.
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(6) && waited < Duration::from_secs(7));
        assert!(notifier.contains("Retrying... (1/3)"));
        assert!(notifier.contains("Retrying... (2/3)"));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_the_retry_budget() {
        let (events, _) = broadcast::channel(8);
        let mut transport = mock_transport(&events);
        transport
            .expect_start()
            .times(4)
            .returning(|_, _| Err(anyhow::anyhow!("assistant unreachable")));
        let notifier = Arc::new(RecordingNotifier::default());
        let mut adapter = TransportAdapter::new(
            transport,
            SessionConfig::default(),
            LogFilterPolicy::default(),
            notifier.clone(),
        );

        let result = adapter.start(&target(), &StartOptions::default()).await;

        assert_eq!(
            result,
            Err(SessionError::TransportStart {
                attempts: 4,
                message: "assistant unreachable".into(),
            })
        );
        assert_eq!(adapter.retry_count(), 3);
        assert_eq!(notifier.count(NotifyKind::Info), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_count_resets_on_each_start() {
        let (events, _) = broadcast::channel(8);
        let mut transport = mock_transport(&events);
        let mut calls = 0;
        transport.expect_start().returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Err(anyhow::anyhow!("network timeout"))
            } else {
                Ok(CallHandle { id: format!("call-{calls}") })
            }
        });
        let mut adapter = TransportAdapter::new(
            transport,
            SessionConfig::default(),
            LogFilterPolicy::default(),
            Arc::new(RecordingNotifier::default()),
        );

        adapter
            .start(&target(), &StartOptions::default())
            .await
            .unwrap();
        assert_eq!(adapter.retry_count(), 1);
        adapter
            .start(&target(), &StartOptions::default())
            .await
            .unwrap();
        assert_eq!(adapter.retry_count(), 0);
    }

    #[tokio::test]
    async fn relays_sdk_events_to_subscribers() {
        let (events, _) = broadcast::channel(8);
        let transport = mock_transport(&events);
        let adapter = TransportAdapter::new(
            transport,
            SessionConfig::default(),
            LogFilterPolicy::default(),
            Arc::new(RecordingNotifier::default()),
        );
        let mut sub = adapter.subscribe();

        events.send(TransportEvent::CallStart).unwrap();

        assert_eq!(sub.recv().await, Some(TransportEvent::CallStart));
        sub.unsubscribe();
        sub.unsubscribe();
        assert!(!sub.is_active());
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn synthesises_one_connection_failure_per_episode() {
        // --- Arrange ---
        let (events, _) = broadcast::channel(8);
        let (states_tx, states_rx) = watch::channel(ConnectionHealth::default());
        let mut transport = MockCallTransport::new();
        let sdk_events = events.clone();
        transport
            .expect_subscribe()
            .returning(move || sdk_events.subscribe());
        transport
            .expect_connection_states()
            .returning(move || Some(states_rx.clone()));
        let adapter = TransportAdapter::new(
            transport,
            SessionConfig::default(),
            LogFilterPolicy::default(),
            Arc::new(RecordingNotifier::default()),
        );
        let mut sub = adapter.subscribe();
        let settle = || tokio::time::sleep(Duration::from_millis(10));

        // --- Act ---
        states_tx.send_modify(|h| h.transport = PeerState::Failed);
        settle().await;
        states_tx.send_modify(|h| h.media = PeerState::Failed);
        settle().await;
        states_tx.send_replace(ConnectionHealth {
            transport: PeerState::Connected,
            media: PeerState::Connected,
        });
        settle().await;
        assert_eq!(adapter.connection_health().transport, PeerState::Connected);
        states_tx.send_modify(|h| h.media = PeerState::Failed);
        settle().await;

        // --- Assert ---
        let mut failures = 0;
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(50), sub.recv()).await
        {
            assert_eq!(event, TransportEvent::ConnectionFailed);
            failures += 1;
        }
        assert_eq!(failures, 2);
    }
}
