#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyKind {
    Info,
    Success,
    Warning,
    Error,
}

/// User-facing notifications (toasts in a UI, lines in a CLI).
pub trait Notifier: Send + Sync {
    fn notify(&self, kind: NotifyKind, message: &str);
}

/// Routes notifications into the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, kind: NotifyKind, message: &str) {
        match kind {
            NotifyKind::Info | NotifyKind::Success => {
                tracing::info!(target: "notify", ?kind, "{message}")
            }
            NotifyKind::Warning => tracing::warn!(target: "notify", "{message}"),
            NotifyKind::Error => tracing::error!(target: "notify", "{message}"),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct RecordingNotifier {
        seen: Mutex<Vec<(NotifyKind, String)>>,
    }

    impl RecordingNotifier {
        pub(crate) fn all(&self) -> Vec<(NotifyKind, String)> {
            self.seen.lock().unwrap().clone()
        }

        pub(crate) fn count(&self, kind: NotifyKind) -> usize {
            self.all().iter().filter(|(k, _)| *k == kind).count()
        }

        pub(crate) fn contains(&self, needle: &str) -> bool {
            self.all().iter().any(|(_, m)| m.contains(needle))
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, kind: NotifyKind, message: &str) {
            self.seen.lock().unwrap().push((kind, message.to_string()));
        }
    }
}
