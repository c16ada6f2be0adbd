use crate::SessionCommand;
use crate::activity::{ActivityMonitor, ActivitySink};
use crate::call_transport::CallTransport;
use crate::call_types::{CallHandle, ConnectionHealth, TranscriptKind, TransportEvent};
use crate::checkpoint::CheckpointStore;
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::feedback::FeedbackHandoff;
use crate::notify::{Notifier, NotifyKind, TracingNotifier};
use crate::preflight::{Preflight, StaticPreflight};
use crate::session_state::{CallSession, CallStatus, SessionKind, Turn};
use crate::setup::SessionSetup;
use crate::store::InterviewStore;
use crate::transport::{LogFilterPolicy, Subscription, TransportAdapter};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};

const INPUT_CAPACITY: usize = 256;

/// Everything that can wake the orchestrator up. All of it goes through one
/// queue, so each input is handled to completion before the next one.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionInput {
    Transport(TransportEvent),
    Command(SessionCommand),
    /// Explicit user input (key press, click).
    Activity,
    IdleDisconnect,
    CheckpointTick,
    /// The deferred reconnect timer fired. Stale epochs are ignored.
    ReconnectDue { epoch: u64 },
    Network { online: bool },
}

/// How a session ended, from the caller's point of view.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    /// Route the user to the feedback report.
    FeedbackReady {
        interview_id: String,
        feedback_id: String,
    },
    QuestionsGenerated,
    /// The call finished but produced no feedback.
    Exited { reason: SessionError },
    /// The caller shut the session down before it finished.
    Abandoned { status: CallStatus },
}

/// The boundary collaborators an orchestrator talks to besides the transport.
pub struct Collaborators {
    pub store: Arc<dyn InterviewStore>,
    pub preflight: Arc<dyn Preflight>,
    pub notifier: Arc<dyn Notifier>,
    pub log_policy: LogFilterPolicy,
}

impl Collaborators {
    pub fn new(store: Arc<dyn InterviewStore>) -> Self {
        Self {
            store,
            preflight: Arc::new(StaticPreflight::default()),
            notifier: Arc::new(TracingNotifier),
            log_policy: LogFilterPolicy::default(),
        }
    }

    pub fn with_preflight(mut self, preflight: Arc<dyn Preflight>) -> Self {
        self.preflight = preflight;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_log_policy(mut self, log_policy: LogFilterPolicy) -> Self {
        self.log_policy = log_policy;
        self
    }
}

/// The caller's side of a running session: send commands, report activity,
/// watch the call status.
#[derive(Clone)]
pub struct SessionHandle {
    inputs: mpsc::Sender<SessionInput>,
    status: watch::Receiver<CallStatus>,
}

impl SessionHandle {
    /// Returns `false` once the orchestrator has stopped listening.
    pub async fn send(&self, command: SessionCommand) -> bool {
        self.inputs
            .send(SessionInput::Command(command))
            .await
            .is_ok()
    }

    pub async fn network_changed(&self, online: bool) -> bool {
        self.inputs
            .send(SessionInput::Network { online })
            .await
            .is_ok()
    }

    pub fn status(&self) -> CallStatus {
        *self.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<CallStatus> {
        self.status.clone()
    }
}

impl ActivitySink for SessionHandle {
    fn report_activity(&self) {
        if self.inputs.try_send(SessionInput::Activity).is_err() {
            tracing::debug!("session input queue full or closed, activity dropped");
        }
    }
}

/// Owns one call session and drives it through
/// `Inactive -> Connecting -> Active -> Finished | Error`.
///
/// Must be created inside a tokio runtime.
pub struct SessionOrchestrator<T: CallTransport> {
    setup: SessionSetup,
    config: SessionConfig,
    session: CallSession,
    adapter: TransportAdapter<T>,
    monitor: ActivityMonitor,
    checkpoints: Option<CheckpointStore>,
    feedback: Option<FeedbackHandoff>,
    preflight: Arc<dyn Preflight>,
    notifier: Arc<dyn Notifier>,
    inputs_tx: mpsc::Sender<SessionInput>,
    inputs_rx: mpsc::Receiver<SessionInput>,
    status_tx: watch::Sender<CallStatus>,
    forwarder: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
    pending_reconnect: Option<JoinHandle<()>>,
    reconnect_epoch: u64,
    attempts: u32,
    shut_down: bool,
}

impl<T: CallTransport> SessionOrchestrator<T> {
    pub fn new(setup: SessionSetup, config: SessionConfig, transport: T, deps: Collaborators) -> Self {
        let Collaborators {
            store,
            preflight,
            notifier,
            log_policy,
        } = deps;

        let adapter = TransportAdapter::new(transport, config.clone(), log_policy, notifier.clone());
        let monitor = ActivityMonitor::new(&config, notifier.clone());
        let (inputs_tx, inputs_rx) = mpsc::channel(INPUT_CAPACITY);
        let (status_tx, _) = watch::channel(CallStatus::Inactive);
        let forwarder = Self::spawn_forwarder(adapter.subscribe(), inputs_tx.clone());

        let key = setup.checkpoint_key();
        let checkpoints = key
            .clone()
            .map(|key| CheckpointStore::new(store.clone(), key));
        let feedback = key.map(|key| {
            FeedbackHandoff::new(store, key, config.min_feedback_turns, notifier.clone())
                .with_existing_feedback(setup.feedback_id().map(str::to_string))
        });

        Self {
            session: CallSession::new(setup.kind()),
            setup,
            config,
            adapter,
            monitor,
            checkpoints,
            feedback,
            preflight,
            notifier,
            inputs_tx,
            inputs_rx,
            status_tx,
            forwarder: Some(forwarder),
            heartbeat: None,
            pending_reconnect: None,
            reconnect_epoch: 0,
            attempts: 0,
            shut_down: false,
        }
    }

    fn spawn_forwarder(
        mut events: Subscription,
        inputs: mpsc::Sender<SessionInput>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if inputs.send(SessionInput::Transport(event)).await.is_err() {
                    break;
                }
            }
            events.unsubscribe();
        })
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            inputs: self.inputs_tx.clone(),
            status: self.status_tx.subscribe(),
        }
    }

    pub fn status(&self) -> CallStatus {
        self.session.status()
    }

    pub fn session(&self) -> &CallSession {
        &self.session
    }

    pub fn connection_health(&self) -> ConnectionHealth {
        self.adapter.connection_health()
    }

    /// Retries the transport performed during the latest start.
    pub fn retry_count(&self) -> u32 {
        self.adapter.retry_count()
    }

    pub fn has_pending_reconnect(&self) -> bool {
        self.pending_reconnect.is_some()
    }

    /// Processes inputs until the session reaches an outcome or is shut down.
    pub async fn run(&mut self) -> SessionOutcome {
        let outcome = loop {
            let Some(input) = self.inputs_rx.recv().await else {
                break SessionOutcome::Abandoned {
                    status: self.session.status(),
                };
            };
            if let Some(outcome) = self.handle_input(input).await {
                break outcome;
            }
        };
        self.shutdown();
        tracing::info!(?outcome, "session finished");
        outcome
    }

    /// Runs the start procedure: microphone check, then `Connecting`,
    /// configuration, network, restore and finally the transport.
    ///
    /// A denied microphone leaves the session `Inactive`. Any later failure
    /// moves it to `Error` with a single notification.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        let status = self.session.status();
        if status != CallStatus::Inactive {
            return Err(SessionError::InvalidTransition {
                from: status,
                to: CallStatus::Connecting,
            });
        }

        if !self.preflight.microphone_permitted().await {
            let err = SessionError::PermissionDenied("microphone permission not granted".into());
            tracing::warn!("{err}");
            self.notifier.notify(NotifyKind::Error, &err.to_string());
            return Err(err);
        }

        self.attempts += 1;
        self.session.transition(CallStatus::Connecting)?;
        self.publish_status();

        match self.connect().await {
            Ok(handle) => {
                tracing::info!(call = %handle.id, attempt = self.attempts, "call dialled, waiting for call-start");
                Ok(())
            }
            Err(err) => {
                self.enter_error(err.clone());
                Err(err)
            }
        }
    }

    async fn connect(&mut self) -> Result<CallHandle, SessionError> {
        let (target, options) = self.setup.call_target()?;
        if !self.preflight.network_reachable().await {
            return Err(SessionError::NetworkUnavailable);
        }
        if self.attempts == 1 {
            self.restore_progress().await;
        }
        self.adapter.start(&target, &options).await
    }

    async fn restore_progress(&mut self) {
        let Some(checkpoints) = &self.checkpoints else {
            return;
        };
        if !self.session.transcript().is_empty() {
            return;
        }
        if let Some(turns) = checkpoints.restore().await {
            if self.session.restore(turns) {
                tracing::info!(
                    turns = self.session.transcript().len(),
                    answered = self.session.questions_answered(),
                    "previous progress restored"
                );
                self.notifier
                    .notify(NotifyKind::Info, "Previous interview progress loaded");
            }
        }
    }

    /// Tears down timers and the event subscription. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.monitor.stop();
        self.stop_heartbeat();
        self.cancel_reconnect();
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
        tracing::debug!("session torn down");
    }

    async fn handle_input(&mut self, input: SessionInput) -> Option<SessionOutcome> {
        match input {
            SessionInput::Transport(event) => self.on_transport_event(event).await,
            SessionInput::Command(command) => self.on_command(command).await,
            SessionInput::Activity => {
                self.monitor.report_activity();
                None
            }
            SessionInput::IdleDisconnect => self.on_idle_disconnect().await,
            SessionInput::CheckpointTick => {
                self.save_checkpoint();
                None
            }
            SessionInput::ReconnectDue { epoch } => {
                self.on_reconnect_due(epoch).await;
                None
            }
            SessionInput::Network { online } => {
                self.on_network_change(online);
                None
            }
        }
    }

    async fn on_command(&mut self, command: SessionCommand) -> Option<SessionOutcome> {
        let status = self.session.status();
        match command {
            SessionCommand::Start => {
                if let Err(err) = self.start().await {
                    tracing::debug!(%err, "start request did not connect");
                }
                None
            }
            SessionCommand::Retry => {
                if status != CallStatus::Error {
                    tracing::debug!(?status, "retry ignored");
                    return None;
                }
                self.cancel_reconnect();
                self.adapter.stop().await;
                if let Err(err) = self.session.reset_for_retry() {
                    tracing::warn!(%err, "retry rejected");
                    return None;
                }
                self.publish_status();
                if let Err(err) = self.start().await {
                    tracing::debug!(%err, "retry did not connect");
                }
                None
            }
            SessionCommand::EndCall => {
                if status != CallStatus::Active {
                    tracing::debug!(?status, "end call ignored");
                    return None;
                }
                self.adapter.stop().await;
                self.notifier.notify(NotifyKind::Info, "Interview ended");
                self.finish().await
            }
            SessionCommand::Shutdown => {
                if matches!(status, CallStatus::Connecting | CallStatus::Active) {
                    self.adapter.stop().await;
                }
                Some(SessionOutcome::Abandoned { status })
            }
        }
    }

    async fn on_transport_event(&mut self, event: TransportEvent) -> Option<SessionOutcome> {
        match event {
            TransportEvent::CallStart => self.on_call_start(),
            TransportEvent::CallEnd => return self.on_call_end().await,
            TransportEvent::Message {
                speaker,
                kind,
                text,
            } => {
                self.monitor.report_activity();
                if kind == TranscriptKind::Final {
                    self.record_turn(Turn::new(speaker, text));
                }
            }
            TransportEvent::SpeechStart | TransportEvent::SpeechEnd => {
                self.monitor.report_activity();
            }
            TransportEvent::Error(message) => {
                self.on_transport_error(SessionError::from_transport_message(&message));
            }
            TransportEvent::ConnectionFailed => {
                self.on_transport_error(SessionError::from_transport_message("connection failed"));
            }
        }
        None
    }

    fn on_call_start(&mut self) {
        let status = self.session.status();
        if status != CallStatus::Connecting {
            tracing::debug!(?status, "call-start ignored");
            return;
        }
        if let Err(err) = self.session.activate(Instant::now()) {
            tracing::warn!(%err, "could not activate call");
            return;
        }
        self.publish_status();
        self.cancel_reconnect();
        tracing::info!(kind = ?self.session.kind(), "call active");
        self.notifier
            .notify(NotifyKind::Success, "Interview started successfully");

        let inputs = self.inputs_tx.clone();
        self.monitor.start(move || {
            if inputs.try_send(SessionInput::IdleDisconnect).is_err() {
                tracing::warn!("session input queue unavailable, idle disconnect dropped");
            }
        });

        if self.checkpoints.is_some() {
            self.start_heartbeat();
            if !self.session.transcript().is_empty() {
                self.save_checkpoint();
            }
        }
    }

    async fn on_call_end(&mut self) -> Option<SessionOutcome> {
        let status = self.session.status();
        if status == CallStatus::Connecting {
            tracing::warn!("call ended before it started");
            self.enter_error(SessionError::CallTooShort);
            return None;
        }
        if status != CallStatus::Active {
            tracing::debug!(?status, "call-end ignored");
            return None;
        }
        self.monitor.stop();
        self.stop_heartbeat();

        let elapsed = self
            .session
            .elapsed_since_start(Instant::now())
            .unwrap_or_default();
        if elapsed < self.config.min_call_duration {
            tracing::warn!(?elapsed, "call ended too soon after it started");
            self.enter_error(SessionError::CallTooShort);
            return None;
        }
        tracing::info!(?elapsed, "call ended");
        self.finish().await
    }

    async fn on_idle_disconnect(&mut self) -> Option<SessionOutcome> {
        if self.session.status() != CallStatus::Active {
            return None;
        }
        self.adapter.stop().await;
        self.notifier.notify(NotifyKind::Info, "Interview ended");
        self.finish().await
    }

    fn on_transport_error(&mut self, err: SessionError) {
        let status = self.session.status();
        match status {
            CallStatus::Connecting | CallStatus::Active => {
                self.monitor.stop();
                self.stop_heartbeat();
                let transient = err.is_transient();
                self.enter_error(err);
                if transient {
                    self.schedule_reconnect();
                }
            }
            CallStatus::Error if err.is_transient() => {
                tracing::debug!(%err, "transient error while failed, rescheduling reconnect");
                self.schedule_reconnect();
            }
            _ => tracing::debug!(%err, ?status, "transport error ignored"),
        }
    }

    async fn on_reconnect_due(&mut self, epoch: u64) {
        if epoch != self.reconnect_epoch || self.pending_reconnect.is_none() {
            tracing::debug!(epoch, current = self.reconnect_epoch, "stale reconnect ignored");
            return;
        }
        self.pending_reconnect = None;
        if self.session.status() != CallStatus::Error {
            return;
        }

        self.notifier
            .notify(NotifyKind::Info, "Attempting to reconnect...");
        self.adapter.stop().await;
        if let Err(err) = self.session.rearm() {
            tracing::warn!(%err, "reconnect rejected");
            return;
        }
        self.publish_status();
        if let Err(err) = self.start().await {
            tracing::debug!(%err, "reconnect did not connect");
        }
    }

    fn on_network_change(&self, online: bool) {
        if !online {
            tracing::warn!("network went offline");
            self.notifier
                .notify(NotifyKind::Error, "Internet connection lost");
        } else if self.adapter.is_reconnecting() || self.pending_reconnect.is_some() {
            self.notifier
                .notify(NotifyKind::Success, "Internet connection restored");
        } else {
            tracing::debug!("network back online");
        }
    }

    fn record_turn(&mut self, turn: Turn) {
        let status = self.session.status();
        if !matches!(status, CallStatus::Connecting | CallStatus::Active) {
            tracing::debug!(?status, "transcript message outside a call ignored");
            return;
        }
        self.session.append(turn);
        self.save_checkpoint();
    }

    fn save_checkpoint(&self) {
        if self.session.status() != CallStatus::Active {
            return;
        }
        if let Some(checkpoints) = &self.checkpoints {
            checkpoints.save(self.session.transcript().to_vec());
        }
    }

    async fn finish(&mut self) -> Option<SessionOutcome> {
        self.monitor.stop();
        self.stop_heartbeat();
        if let Err(err) = self.session.transition(CallStatus::Finished) {
            tracing::warn!(%err, "could not finish call");
            return None;
        }
        self.publish_status();
        Some(self.hand_off().await)
    }

    async fn hand_off(&self) -> SessionOutcome {
        match self.session.kind() {
            SessionKind::GenerateQuestions => {
                self.notifier
                    .notify(NotifyKind::Success, "Interview questions generated!");
                SessionOutcome::QuestionsGenerated
            }
            SessionKind::ConductInterview => {
                let Some(feedback) = &self.feedback else {
                    return SessionOutcome::Exited {
                        reason: SessionError::FeedbackGeneration("interview has no id".into()),
                    };
                };
                match feedback.generate(self.session.transcript()).await {
                    Ok(feedback_id) => SessionOutcome::FeedbackReady {
                        interview_id: feedback.interview_id().to_string(),
                        feedback_id,
                    },
                    Err(reason) => SessionOutcome::Exited { reason },
                }
            }
        }
    }

    fn enter_error(&mut self, err: SessionError) {
        let message = err.to_string();
        if let Err(transition) = self.session.fail(message.clone()) {
            tracing::warn!(%transition, %message, "error outside a call");
            return;
        }
        self.publish_status();
        tracing::error!(%message, "call session failed");
        self.notifier.notify(NotifyKind::Error, &message);
    }

    fn schedule_reconnect(&mut self) {
        self.cancel_reconnect();
        self.reconnect_epoch += 1;
        let epoch = self.reconnect_epoch;
        let delay = self.config.reconnect_delay;
        let inputs = self.inputs_tx.clone();
        self.pending_reconnect = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = inputs.send(SessionInput::ReconnectDue { epoch }).await;
        }));
        tracing::info!(epoch, ?delay, "reconnect scheduled");
    }

    fn cancel_reconnect(&mut self) {
        if let Some(pending) = self.pending_reconnect.take() {
            pending.abort();
        }
    }

    fn start_heartbeat(&mut self) {
        self.stop_heartbeat();
        let inputs = self.inputs_tx.clone();
        let period = self.config.checkpoint_interval;
        self.heartbeat = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if inputs.send(SessionInput::CheckpointTick).await.is_err() {
                    break;
                }
            }
        }));
    }

    fn stop_heartbeat(&mut self) {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.abort();
        }
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(self.session.status());
    }
}

impl<T: CallTransport> Drop for SessionOrchestrator<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
