use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

/// Checks that must pass before a call is dialled.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Preflight: Send + Sync {
    /// Whether the user already granted access to the audio input device.
    async fn microphone_permitted(&self) -> bool;

    async fn network_reachable(&self) -> bool;
}

/// Fixed answers, for environments where the checks are done elsewhere.
#[derive(Debug, Clone, Copy)]
pub struct StaticPreflight {
    pub microphone: bool,
    pub network: bool,
}

impl Default for StaticPreflight {
    fn default() -> Self {
        Self {
            microphone: true,
            network: true,
        }
    }
}

#[async_trait]
impl Preflight for StaticPreflight {
    async fn microphone_permitted(&self) -> bool {
        self.microphone
    }

    async fn network_reachable(&self) -> bool {
        self.network
    }
}
