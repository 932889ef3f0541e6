//! Async driver for the escalation manager
//!
//! Sends run as tasks so classification never waits on the network. Each
//! task reports its outcome back to the manager when the sink returns or
//! the send timeout fires.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use metrics::counter;
use tokio::runtime::Handle;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use dms::ActivityEvent;

use crate::config::AlertConfig;
use crate::history::{NotificationRecord, SinkResult};
use crate::manager::{
    AlertDetails, EpisodeTransition, EscalationManager, EscalationStatus, NotificationRequest,
    TimeoutCheck,
};
use crate::notifier::{DeliveryReceipt, NotificationMessage, NotificationSink, SinkError};
use crate::AlertError;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Call a sink with an upper bound on how long it may take
pub async fn deliver(
    sink: &dyn NotificationSink,
    message: &NotificationMessage,
    timeout: Duration,
) -> Result<DeliveryReceipt, SinkError> {
    match tokio::time::timeout(timeout, sink.send(message)).await {
        Ok(result) => result,
        Err(_) => Err(SinkError::Timeout(timeout)),
    }
}

fn record_outcome(result: &SinkResult) {
    let outcome = if result.success { "sent" } else { "failed" };
    counter!("alert_notifications_total", "outcome" => outcome).increment(1);
}

/// Escalation manager wired to a notification sink
pub struct EscalationService {
    manager: Arc<Mutex<EscalationManager>>,
    sink: Arc<dyn NotificationSink>,
    tasks: Mutex<JoinSet<()>>,
    send_timeout: Duration,
}

impl EscalationService {
    pub fn new(config: AlertConfig, sink: Arc<dyn NotificationSink>) -> Result<Self, AlertError> {
        let send_timeout = Duration::from_secs_f64(config.send_timeout_secs.max(0.001));
        let manager = EscalationManager::new(config)?;
        info!(sink = sink.name(), "Escalation service ready");
        Ok(Self {
            manager: Arc::new(Mutex::new(manager)),
            sink,
            tasks: Mutex::new(JoinSet::new()),
            send_timeout,
        })
    }

    pub fn sink_name(&self) -> &'static str {
        self.sink.name()
    }

    fn track(&self, transition: EpisodeTransition) -> EpisodeTransition {
        if let EpisodeTransition::Started(_) = transition {
            counter!("alert_episodes_started_total").increment(1);
        }
        transition
    }

    pub fn observe_at(&self, event: &ActivityEvent, now: Instant) -> EpisodeTransition {
        let transition = lock(&self.manager).on_activity_observed(event, now);
        self.track(transition)
    }

    pub fn trigger_at(&self, details: AlertDetails, now: Instant) -> EpisodeTransition {
        let transition = lock(&self.manager).on_alarm_triggered(details, now);
        self.track(transition)
    }

    pub fn respond_at(&self, now: Instant) -> EpisodeTransition {
        lock(&self.manager).on_driver_response(now)
    }

    /// Run a timeout check, starting a background send when one is due
    pub fn check_timeout_at(&self, now: Instant) -> TimeoutCheck {
        let check = lock(&self.manager).check_timeout(now);
        match &check {
            TimeoutCheck::Dispatch(request) => self.spawn_dispatch(request.clone()),
            TimeoutCheck::RateLimited { .. } => {
                counter!("alert_notifications_total", "outcome" => "rate_limited").increment(1);
            }
            _ => {}
        }
        check
    }

    fn spawn_dispatch(&self, request: NotificationRequest) {
        let manager = Arc::clone(&self.manager);
        let sink = Arc::clone(&self.sink);
        let timeout = self.send_timeout;

        let Ok(handle) = Handle::try_current() else {
            error!(request_id = request.request_id, "No async runtime, notification not sent");
            let outcome = Err(SinkError::Transport("no async runtime available".to_string()));
            let result = lock(&self.manager).complete_dispatch(&request, &outcome);
            record_outcome(&result);
            return;
        };

        debug!(request_id = request.request_id, sink = sink.name(), "Dispatching notification");
        let mut tasks = lock(&self.tasks);
        while let Some(joined) = tasks.try_join_next() {
            if let Err(e) = joined {
                error!("Notification task failed: {}", e);
            }
        }
        tasks.spawn_on(
            async move {
                let outcome = deliver(sink.as_ref(), &request.message, timeout).await;
                let result = lock(&manager).complete_dispatch(&request, &outcome);
                record_outcome(&result);
            },
            &handle,
        );
    }

    /// Send a test notification now, ignoring the cooldown
    pub async fn force_send_at(&self, now: Instant) -> SinkResult {
        let request = lock(&self.manager).force_send(now);
        info!(request_id = request.request_id, sink = self.sink.name(), "Sending test notification");
        let outcome = deliver(self.sink.as_ref(), &request.message, self.send_timeout).await;
        let result = lock(&self.manager).complete_dispatch(&request, &outcome);
        record_outcome(&result);
        result
    }

    pub fn status_at(&self, now: Instant) -> EscalationStatus {
        lock(&self.manager).status(now)
    }

    pub fn history(&self, limit: usize) -> Vec<NotificationRecord> {
        lock(&self.manager).history(limit)
    }

    pub fn is_alarm_active(&self) -> bool {
        lock(&self.manager).is_alarm_active()
    }

    /// Wait for every background send to finish and record its outcome
    pub async fn flush(&self) {
        let mut tasks = std::mem::take(&mut *lock(&self.tasks));
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("Notification task failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::DisabledSink;
    use async_trait::async_trait;
    use dms::AlertLevel;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSink {
        calls: AtomicUsize,
        fail: bool,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl NotificationSink for CountingSink {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn send(&self, _message: &NotificationMessage) -> Result<DeliveryReceipt, SinkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                Err(SinkError::Rejected {
                    status: 500,
                    body: "server error".to_string(),
                })
            } else {
                Ok(DeliveryReceipt::new("ok"))
            }
        }
    }

    fn details() -> AlertDetails {
        AlertDetails::new("looking_down_phone", 0.9, AlertLevel::Critical, 5.0, "Looking down for 5.0s")
    }

    fn at(origin: Instant, secs: f64) -> Instant {
        origin + Duration::from_secs_f64(secs)
    }

    #[tokio::test]
    async fn test_repeated_checks_send_once() {
        let sink = Arc::new(CountingSink::default());
        let service = EscalationService::new(AlertConfig::default(), sink.clone()).unwrap();
        let t0 = Instant::now();
        service.trigger_at(details(), t0);

        let dispatched = (0..5)
            .filter(|i| {
                matches!(
                    service.check_timeout_at(at(t0, 10.0 + *i as f64 * 0.1)),
                    TimeoutCheck::Dispatch(_)
                )
            })
            .count();
        assert_eq!(dispatched, 1);

        service.flush().await;
        assert!(matches!(
            service.check_timeout_at(at(t0, 12.0)),
            TimeoutCheck::AlreadyNotified
        ));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        assert_eq!(service.history(10).len(), 1);
        assert_eq!(service.status_at(at(t0, 12.0)).total_notifications_sent, 1);
    }

    #[tokio::test]
    async fn test_unconfigured_sink_is_recorded() {
        let service = EscalationService::new(AlertConfig::default(), Arc::new(DisabledSink)).unwrap();
        let t0 = Instant::now();
        service.trigger_at(details(), t0);
        service.check_timeout_at(at(t0, 11.0));
        service.flush().await;

        let history = service.history(10);
        assert_eq!(history.len(), 1);
        assert!(!history[0].result.success);
        assert!(history[0].result.error.as_deref().unwrap().contains("not configured"));
        assert!(!service.status_at(at(t0, 11.0)).notified);
    }

    #[tokio::test]
    async fn test_send_timeout_counts_as_failure() {
        let sink = Arc::new(CountingSink {
            delay: Some(Duration::from_millis(200)),
            ..Default::default()
        });
        let config = AlertConfig {
            send_timeout_secs: 0.02,
            ..Default::default()
        };
        let service = EscalationService::new(config, sink).unwrap();
        let t0 = Instant::now();
        service.trigger_at(details(), t0);
        service.check_timeout_at(at(t0, 10.0));
        service.flush().await;

        let history = service.history(1);
        assert!(!history[0].result.success);
        assert!(history[0].result.error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_rejected_send_then_retry() {
        let sink = Arc::new(CountingSink {
            fail: true,
            ..Default::default()
        });
        let service = EscalationService::new(AlertConfig::default(), sink.clone()).unwrap();
        let t0 = Instant::now();
        service.trigger_at(details(), t0);

        service.check_timeout_at(at(t0, 10.0));
        service.flush().await;
        assert!(matches!(
            service.check_timeout_at(at(t0, 11.0)),
            TimeoutCheck::Backoff { .. }
        ));
        assert!(matches!(
            service.check_timeout_at(at(t0, 15.5)),
            TimeoutCheck::Dispatch(_)
        ));
        service.flush().await;

        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
        assert_eq!(service.history(10).len(), 2);
        assert_eq!(service.status_at(at(t0, 16.0)).total_notifications_sent, 0);
    }

    async fn settle(service: &EscalationService, now: Instant) {
        while service.status_at(now).send_in_flight {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_finished_sends_are_reaped() {
        let sink = Arc::new(CountingSink {
            fail: true,
            ..Default::default()
        });
        let service = EscalationService::new(AlertConfig::default(), sink.clone()).unwrap();
        let t0 = Instant::now();
        service.trigger_at(details(), t0);

        for attempt in 0..6 {
            let now = at(t0, 10.0 + attempt as f64 * 5.0);
            assert!(matches!(service.check_timeout_at(now), TimeoutCheck::Dispatch(_)));
            assert_eq!(lock(&service.tasks).len(), 1);
            settle(&service, now).await;
        }

        assert_eq!(sink.calls.load(Ordering::SeqCst), 6);
        assert_eq!(service.history(10).len(), 6);
        service.flush().await;
        assert!(lock(&service.tasks).is_empty());
    }

    #[tokio::test]
    async fn test_cooldown_blocks_second_episode_send() {
        let sink = Arc::new(CountingSink::default());
        let service = EscalationService::new(AlertConfig::default(), sink.clone()).unwrap();
        let t0 = Instant::now();

        service.trigger_at(details(), t0);
        service.check_timeout_at(at(t0, 10.0));
        service.flush().await;
        service.respond_at(at(t0, 20.0));

        service.trigger_at(details(), at(t0, 30.0));
        for secs in [40.0, 60.0, 100.0] {
            assert!(matches!(
                service.check_timeout_at(at(t0, secs)),
                TimeoutCheck::RateLimited { .. }
            ));
        }
        service.flush().await;

        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        assert_eq!(service.history(10).len(), 1);
        assert!(!service.status_at(at(t0, 100.0)).notified);
    }

    #[tokio::test]
    async fn test_force_send_reports_result() {
        let sink = Arc::new(CountingSink::default());
        let service = EscalationService::new(AlertConfig::default(), sink.clone()).unwrap();

        let result = service.force_send_at(Instant::now()).await;
        assert!(result.success);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        assert!(service.history(1)[0].forced);
        assert!(!service.is_alarm_active());
    }

    #[test]
    fn test_dispatch_without_runtime_is_recorded() {
        let service =
            EscalationService::new(AlertConfig::default(), Arc::new(CountingSink::default())).unwrap();
        let t0 = Instant::now();
        service.trigger_at(details(), t0);
        assert!(matches!(
            service.check_timeout_at(at(t0, 10.0)),
            TimeoutCheck::Dispatch(_)
        ));

        let history = service.history(1);
        assert!(!history[0].result.success);
        assert!(!service.status_at(at(t0, 10.0)).send_in_flight);
    }
}
