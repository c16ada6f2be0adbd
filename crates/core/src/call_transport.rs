use crate::call_types::{CallHandle, CallTarget, ConnectionHealth, StartOptions, TransportEvent};
use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::sync::{broadcast, watch};

/// A trait abstracting the real-time call SDK.
/// The orchestrator only ever talks to it through `TransportAdapter`, which
/// adds retries and connection-failure detection on top.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CallTransport: Send + Sync {
    /// Dials the target. Fails if the session could not be established.
    async fn start(&mut self, target: &CallTarget, options: &StartOptions) -> Result<CallHandle>;

    /// Hangs up the current call, if any.
    async fn stop(&mut self) -> Result<()>;

    /// Returns a receiver for the SDK's domain events.
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;

    /// Low-level connection state notifications. `None` when the SDK does not
    /// expose them, in which case no connection failures are synthesised.
    fn connection_states(&self) -> Option<watch::Receiver<ConnectionHealth>>;
}
