use anyhow::{Context, Result};
use async_trait::async_trait;
use call_client::types::{ServerEvent, Target, TranscriptType};
use interview_core::call_transport::CallTransport;
use interview_core::call_types::{
    CallHandle, CallTarget, ConnectionHealth, PeerState, StartOptions, TranscriptKind,
    TransportEvent,
};
use interview_core::session_state::Speaker;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// The slice of `call_client::Client` the adapter needs. Exists so the adapter
/// can be tested against a mock.
#[async_trait]
pub trait RelayClient: Send + Sync {
    async fn start_call(
        &mut self,
        target: Target,
        variable_values: BTreeMap<String, String>,
    ) -> Result<()>;
    async fn stop_call(&mut self) -> Result<()>;
    async fn reconnect(&mut self) -> Result<()>;
    fn server_events(&self) -> Result<call_client::ServerRx>;
}

#[async_trait]
impl RelayClient for call_client::Client {
    async fn start_call(
        &mut self,
        target: Target,
        variable_values: BTreeMap<String, String>,
    ) -> Result<()> {
        call_client::Client::start_call(self, target, variable_values).await
    }

    async fn stop_call(&mut self) -> Result<()> {
        call_client::Client::stop_call(self).await
    }

    async fn reconnect(&mut self) -> Result<()> {
        call_client::Client::reconnect(self).await
    }

    fn server_events(&self) -> Result<call_client::ServerRx> {
        call_client::Client::server_events(self)
    }
}

/// What a relay frame means to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Translated {
    Event(TransportEvent),
    TransportState(PeerState),
    MediaState(PeerState),
    Ignored,
}

pub fn translate(event: ServerEvent) -> Translated {
    match event {
        ServerEvent::CallStart => Translated::Event(TransportEvent::CallStart),
        ServerEvent::CallEnd => Translated::Event(TransportEvent::CallEnd),
        ServerEvent::Transcript(t) => {
            let speaker = match t.role.to_lowercase().as_str() {
                "user" => Speaker::User,
                "assistant" | "bot" => Speaker::Assistant,
                "system" => Speaker::System,
                other => {
                    tracing::debug!(role = other, "transcript from unknown role dropped");
                    return Translated::Ignored;
                }
            };
            let kind = match t.transcript_type {
                TranscriptType::Partial => TranscriptKind::Partial,
                TranscriptType::Final => TranscriptKind::Final,
            };
            Translated::Event(TransportEvent::Message {
                speaker,
                kind,
                text: t.transcript,
            })
        }
        ServerEvent::SpeechStart => Translated::Event(TransportEvent::SpeechStart),
        ServerEvent::SpeechEnd => Translated::Event(TransportEvent::SpeechEnd),
        ServerEvent::Error { message } => {
            Translated::Event(TransportEvent::Error(message.unwrap_or_default()))
        }
        ServerEvent::ConnectionState { state } => {
            Translated::TransportState(PeerState::from(state.as_str()))
        }
        ServerEvent::MediaState { state } => Translated::MediaState(PeerState::from(state.as_str())),
        ServerEvent::Close { reason } => {
            let message = match reason {
                Some(reason) => format!("Relay connection closed: {reason}"),
                None => "Relay connection closed".to_string(),
            };
            Translated::Event(TransportEvent::Error(message))
        }
    }
}

fn relay_target(target: &CallTarget) -> Target {
    match target {
        CallTarget::Workflow(id) => Target::Workflow(id.clone()),
        CallTarget::Assistant(id) => Target::Assistant(id.clone()),
    }
}

/// Implements `CallTransport` on top of the call relay.
pub struct RelayTransport<C: RelayClient> {
    client: C,
    events: broadcast::Sender<TransportEvent>,
    states: watch::Sender<ConnectionHealth>,
    closed: Arc<AtomicBool>,
    pump: Option<JoinHandle<()>>,
}

impl<C: RelayClient> RelayTransport<C> {
    /// Wraps a connected client. Must run inside a tokio runtime.
    pub fn new(client: C) -> Result<Self> {
        let (events, _) = broadcast::channel(256);
        let (states, _) = watch::channel(ConnectionHealth::default());
        let mut transport = Self {
            client,
            events,
            states,
            closed: Arc::new(AtomicBool::new(false)),
            pump: None,
        };
        transport.spawn_pump()?;
        Ok(transport)
    }

    fn spawn_pump(&mut self) -> Result<()> {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        let mut rx = self
            .client
            .server_events()
            .context("Relay client is not connected")?;
        let events = self.events.clone();
        let states = self.states.clone();
        let closed = self.closed.clone();
        closed.store(false, Ordering::SeqCst);

        self.pump = Some(tokio::spawn(async move {
            loop {
                let event = match rx.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "relay events dropped");
                        continue;
                    }
                    Err(RecvError::Closed) => {
                        closed.store(true, Ordering::SeqCst);
                        break;
                    }
                };
                if matches!(event, ServerEvent::Close { .. }) {
                    closed.store(true, Ordering::SeqCst);
                }
                match translate(event) {
                    Translated::Event(event) => {
                        let _ = events.send(event);
                    }
                    Translated::TransportState(state) => {
                        states.send_modify(|health| health.transport = state);
                    }
                    Translated::MediaState(state) => {
                        states.send_modify(|health| health.media = state);
                    }
                    Translated::Ignored => {}
                }
            }
            tracing::debug!("relay event pump stopped");
        }));
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<C: RelayClient> CallTransport for RelayTransport<C> {
    async fn start(&mut self, target: &CallTarget, options: &StartOptions) -> Result<CallHandle> {
        if self.is_closed() {
            tracing::info!("relay connection closed, reconnecting");
            self.client
                .reconnect()
                .await
                .context("Failed to reconnect to the call relay")?;
            self.spawn_pump()?;
            self.states.send_replace(ConnectionHealth::default());
        }

        self.client
            .start_call(relay_target(target), options.variable_values.clone())
            .await
            .context("Failed to send call.start to the relay")?;

        Ok(CallHandle {
            id: uuid::Uuid::new_v4().to_string(),
        })
    }

    async fn stop(&mut self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        self.client
            .stop_call()
            .await
            .context("Failed to send call.stop to the relay")
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    fn connection_states(&self) -> Option<watch::Receiver<ConnectionHealth>> {
        Some(self.states.subscribe())
    }
}

impl<C: RelayClient> Drop for RelayTransport<C> {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}
