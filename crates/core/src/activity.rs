use crate::config::SessionConfig;
use crate::notify::{Notifier, NotifyKind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};

/// Anything that can tell the session "the user is still here": key presses,
/// mouse movement, voice activity.
pub trait ActivitySink: Send + Sync {
    fn report_activity(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleSignal {
    Warn,
    Disconnect,
}

/// Idle bookkeeping for one call. Each signal fires at most once per idle
/// episode; recording activity starts a new episode.
#[derive(Debug)]
pub struct IdleTracker {
    last_activity: Instant,
    warn_after: Duration,
    disconnect_after: Duration,
    warned: bool,
    disconnected: bool,
}

impl IdleTracker {
    pub fn new(now: Instant, warn_after: Duration, disconnect_after: Duration) -> Self {
        Self {
            last_activity: now,
            warn_after,
            disconnect_after,
            warned: false,
            disconnected: false,
        }
    }

    pub fn record(&mut self, now: Instant) {
        self.last_activity = now;
        self.warned = false;
        self.disconnected = false;
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    pub fn poll(&mut self, now: Instant) -> Option<IdleSignal> {
        if self.disconnected {
            return None;
        }
        let idle = self.idle_for(now);
        if idle > self.disconnect_after {
            self.disconnected = true;
            self.warned = true;
            return Some(IdleSignal::Disconnect);
        }
        if idle > self.warn_after && !self.warned {
            self.warned = true;
            return Some(IdleSignal::Warn);
        }
        None
    }
}

/// Polls an `IdleTracker` while a call is active and ends the call when the
/// user has gone quiet for too long.
pub struct ActivityMonitor {
    tracker: Arc<Mutex<IdleTracker>>,
    poll_interval: Duration,
    notifier: Arc<dyn Notifier>,
    poller: Option<JoinHandle<()>>,
}

impl ActivityMonitor {
    pub fn new(config: &SessionConfig, notifier: Arc<dyn Notifier>) -> Self {
        let tracker = IdleTracker::new(
            Instant::now(),
            config.idle_warn_after,
            config.idle_disconnect_after,
        );
        Self {
            tracker: Arc::new(Mutex::new(tracker)),
            poll_interval: config.idle_poll_interval,
            notifier,
            poller: None,
        }
    }

    /// Begins a fresh idle episode and polls until `stop`. A running poll is
    /// replaced.
    pub fn start<F>(&mut self, on_idle_disconnect: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.stop();
        self.record_activity();

        let tracker = self.tracker.clone();
        let notifier = self.notifier.clone();
        let period = self.poll_interval;
        self.poller = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let signal = lock(&tracker).poll(Instant::now());
                match signal {
                    Some(IdleSignal::Warn) => {
                        tracing::warn!("user idle, warning issued");
                        notifier.notify(
                            NotifyKind::Warning,
                            "Connection may be unstable due to inactivity...",
                        );
                    }
                    Some(IdleSignal::Disconnect) => {
                        tracing::warn!("user idle too long, disconnecting");
                        notifier.notify(
                            NotifyKind::Error,
                            "Connection lost due to prolonged inactivity. Please try again.",
                        );
                        on_idle_disconnect();
                    }
                    None => {}
                }
            }
        }));
    }

    pub fn stop(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
    }

    pub fn record_activity(&self) {
        lock(&self.tracker).record(Instant::now());
    }

    pub fn is_running(&self) -> bool {
        self.poller.is_some()
    }

    pub fn idle_for(&self) -> Duration {
        lock(&self.tracker).idle_for(Instant::now())
    }
}

impl ActivitySink for ActivityMonitor {
    fn report_activity(&self) {
        self.record_activity();
    }
}

impl Drop for ActivityMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock(tracker: &Mutex<IdleTracker>) -> MutexGuard<'_, IdleTracker> {
    tracker.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::testing::RecordingNotifier;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tracker(start: Instant) -> IdleTracker {
        IdleTracker::new(start, Duration::from_secs(45), Duration::from_secs(60))
    }

    #[test]
    fn warns_only_after_the_threshold() {
        let t0 = Instant::now();
        let mut idle = tracker(t0);

        assert_eq!(idle.poll(t0 + Duration::from_millis(44_900)), None);
        assert_eq!(
            idle.poll(t0 + Duration::from_millis(45_100)),
            Some(IdleSignal::Warn)
        );
        assert_eq!(idle.poll(t0 + Duration::from_secs(50)), None);
    }

    #[test]
    fn disconnects_once_per_episode() {
        let t0 = Instant::now();
        let mut idle = tracker(t0);

        assert_eq!(idle.poll(t0 + Duration::from_secs(50)), Some(IdleSignal::Warn));
        assert_eq!(
            idle.poll(t0 + Duration::from_secs(61)),
            Some(IdleSignal::Disconnect)
        );
        assert_eq!(idle.poll(t0 + Duration::from_secs(120)), None);

        // Activity opens a new episode.
        let t1 = t0 + Duration::from_secs(130);
        idle.record(t1);
        assert_eq!(idle.poll(t1 + Duration::from_secs(46)), Some(IdleSignal::Warn));
    }

    #[test]
    fn disconnect_wins_when_both_thresholds_pass() {
        let t0 = Instant::now();
        let mut idle = tracker(t0);

        assert_eq!(
            idle.poll(t0 + Duration::from_secs(90)),
            Some(IdleSignal::Disconnect)
        );
        assert_eq!(idle.poll(t0 + Duration::from_secs(95)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn monitor_warns_then_disconnects_exactly_once() {
        // --- Arrange ---
        let notifier = Arc::new(RecordingNotifier::default());
        let mut monitor = ActivityMonitor::new(&SessionConfig::default(), notifier.clone());
        let disconnects = Arc::new(AtomicUsize::new(0));
        let counter = disconnects.clone();

        // --- Act ---
        monitor.start(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_secs(46)).await;
        assert_eq!(notifier.count(NotifyKind::Warning), 0);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(notifier.count(NotifyKind::Warning), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;

        // --- Assert ---
        assert_eq!(notifier.count(NotifyKind::Warning), 1);
        assert_eq!(notifier.count(NotifyKind::Error), 1);
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
        assert!(monitor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn activity_postpones_the_warning() {
        let notifier = Arc::new(RecordingNotifier::default());
        let mut monitor = ActivityMonitor::new(&SessionConfig::default(), notifier.clone());
        monitor.start(|| {});

        tokio::time::sleep(Duration::from_secs(31)).await;
        monitor.report_activity();
        tokio::time::sleep(Duration::from_secs(31)).await;

        assert_eq!(notifier.count(NotifyKind::Warning), 0);
        assert!(monitor.idle_for() < Duration::from_secs(45));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_silences_the_poll() {
        let notifier = Arc::new(RecordingNotifier::default());
        let mut monitor = ActivityMonitor::new(&SessionConfig::default(), notifier.clone());
        monitor.start(|| {});

        monitor.stop();
        monitor.stop();
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert!(!monitor.is_running());
        assert!(notifier.all().is_empty());
    }
}
