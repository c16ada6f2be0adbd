use crate::types::ServerEvent;

/// Counters for what the relay sent over the lifetime of a connection.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Stats {
    events_received: u64,
    calls_started: u64,
    calls_ended: u64,
    errors: u64,
}

impl Stats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, event: &ServerEvent) {
        self.events_received += 1;
        match event {
            ServerEvent::CallStart => self.calls_started += 1,
            ServerEvent::CallEnd => self.calls_ended += 1,
            ServerEvent::Error { .. } => self.errors += 1,
            _ => {}
        }
    }

    pub fn events_received(&self) -> u64 {
        self.events_received
    }

    pub fn calls_started(&self) -> u64 {
        self.calls_started
    }

    pub fn calls_ended(&self) -> u64 {
        self.calls_ended
    }

    pub fn errors(&self) -> u64 {
        self.errors
    }
}
