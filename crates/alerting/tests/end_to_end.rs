//! Full pipeline runs: in-memory queue, repository and cache, with a recording
//! notifier standing in for the providers.

use alerting::{serve, AlertingError, DedupGate, Processor, Stores, Timeouts};
use async_trait::async_trait;
use cache::MemoryCache;
use chrono::Utc;
use models::{
    Alarm, AlarmType, AlertStatus, Device, Event, EventMessage, Org, Point, PointValue, Rule,
    Status, User,
};
use notify::{Dispatcher, Notifier, NotifyError, RateLimitConfig};
use queue::MemoryQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use storage::{AlarmQuery, AlarmStore, OrgStore, Repository, StorageError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Counts org and alarm lookups; fails the first `org_failures` org reads
struct CountingStore {
    inner: Arc<Repository>,
    org_reads: AtomicUsize,
    alarm_lists: AtomicUsize,
    org_failures: AtomicUsize,
}

#[async_trait]
impl OrgStore for CountingStore {
    async fn read_org(&self, org_id: &str) -> Result<Org, StorageError> {
        self.org_reads.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .org_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StorageError::DatabaseError("connection reset".to_string()));
        }
        self.inner.read_org(org_id).await
    }
}

#[async_trait]
impl AlarmStore for CountingStore {
    async fn list_alarms(
        &self,
        org_id: &str,
        query: &AlarmQuery,
    ) -> Result<(Vec<Alarm>, i64), StorageError> {
        self.alarm_lists.fetch_add(1, Ordering::SeqCst);
        self.inner.list_alarms(org_id, query).await
    }
}

#[derive(Debug, Clone)]
struct Sent {
    channel: &'static str,
    to: String,
    at: Instant,
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<Sent>>,
    failing: Vec<String>,
}

impl RecordingNotifier {
    fn failing_for(to: &str) -> Self {
        Self {
            failing: vec![to.to_string()],
            ..Default::default()
        }
    }

    fn record(&self, channel: &'static str, to: &str) -> Result<(), NotifyError> {
        if self.failing.iter().any(|f| f == to) {
            return Err(NotifyError::Provider(format!("{to} unreachable")));
        }
        self.sent.lock().unwrap().push(Sent {
            channel,
            to: to.to_string(),
            at: Instant::now(),
        });
        Ok(())
    }

    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn app(&self, app_key: &str, _subject: &str, _body: &str) -> Result<(), NotifyError> {
        self.record("app", app_key)
    }

    async fn sms(&self, phone: &str, _subject: &str, _body: &str) -> Result<(), NotifyError> {
        self.record("sms", phone)
    }

    async fn email(
        &self,
        _org_display_name: &str,
        _org_email: &str,
        user_email: &str,
        _subject: &str,
        _body: &str,
    ) -> Result<(), NotifyError> {
        self.record("email", user_email)
    }

    async fn validate_app(&self, _app_key: &str) -> Result<(), NotifyError> {
        Ok(())
    }

    async fn validate_sms(&self, _phone: &str) -> Result<(), NotifyError> {
        Ok(())
    }

    async fn validate_email(&self, _email: &str) -> Result<(), NotifyError> {
        Ok(())
    }
}

struct Harness {
    queue: Arc<MemoryQueue>,
    repo: Arc<Repository>,
    store: Arc<CountingStore>,
    notifier: Arc<RecordingNotifier>,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<Result<(), AlertingError>>,
}

impl Harness {
    fn start(repo: Arc<Repository>, notifier: RecordingNotifier) -> Self {
        Self::start_with(repo, notifier, 0, RateLimitConfig {
            app_ms: 0,
            sms_ms: 0,
            email_ms: 0,
        })
    }

    fn start_with(
        repo: Arc<Repository>,
        notifier: RecordingNotifier,
        org_failures: usize,
        limits: RateLimitConfig,
    ) -> Self {
        let queue = Arc::new(MemoryQueue::new(64, Duration::ZERO));
        let cache = Arc::new(MemoryCache::new());
        let notifier = Arc::new(notifier);
        let store = Arc::new(CountingStore {
            inner: repo.clone(),
            org_reads: AtomicUsize::new(0),
            alarm_lists: AtomicUsize::new(0),
            org_failures: AtomicUsize::new(org_failures),
        });

        let stores = Stores {
            orgs: store.clone(),
            alarms: store.clone(),
            ..Stores::shared(repo.clone())
        };
        let processor = Arc::new(Processor::new(
            stores,
            DedupGate::new(cache.clone()),
            Dispatcher::new(notifier.clone(), cache, limits),
            Timeouts::default(),
        ));

        let (shutdown, rx) = watch::channel(false);
        let handle = tokio::spawn(serve(queue.clone(), processor, 4, rx));

        Self {
            queue,
            repo,
            store,
            notifier,
            shutdown,
            handle,
        }
    }

    async fn publish(&self, payload: Vec<u8>) {
        self.queue.publish(payload).await.unwrap();
    }

    /// Wait until `n` deliveries have been acknowledged
    async fn settled(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while self.queue.acked() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("deliveries were not settled in time");
    }

    async fn stop(self) {
        self.shutdown.send(true).unwrap();
        self.handle.await.unwrap().unwrap();
    }
}

fn event() -> Event {
    Event {
        point: Point {
            uniq_id: "uniq-1".to_string(),
            attr: "temp".to_string(),
            value: Some(PointValue::Int(40)),
            ts: Utc::now(),
            trace_id: "trace-1".to_string(),
        },
        device: Device {
            id: "dev-1".to_string(),
            org_id: "org-1".to_string(),
            uniq_id: "uniq-1".to_string(),
            name: "boiler".to_string(),
        },
        rule: Rule {
            id: "rule-1".to_string(),
            name: "Too hot".to_string(),
            attr: "temp".to_string(),
            expr: "pointVal > 32".to_string(),
        },
    }
}

fn alarm(alarm_type: AlarmType, status: Status) -> Alarm {
    Alarm {
        id: "alarm-1".to_string(),
        org_id: "org-1".to_string(),
        rule_id: "rule-1".to_string(),
        name: "Boiler temperature".to_string(),
        status,
        alarm_type,
        user_tags: vec!["ops".to_string()],
        subject_template: "{{ device.name }}: {{ rule.name }}".to_string(),
        body_template: "Value {{ pointVal }} at {{ pointTS }}".to_string(),
        repeat_interval: 15,
        created_at: Utc::now(),
    }
}

fn user(id: &str) -> User {
    User {
        id: id.to_string(),
        org_id: "org-1".to_string(),
        email: format!("{id}@acme.example"),
        phone: "+15125551212".to_string(),
        app_key: format!("key{id}"),
        status: Status::Active,
        tags: vec!["ops".to_string()],
    }
}

fn repo(alarm: Alarm, users: &[&str]) -> Arc<Repository> {
    let repo = Arc::new(Repository::new());
    repo.insert_org(Org {
        id: "org-1".to_string(),
        display_name: "Acme".to_string(),
        email: "alerts@acme.example".to_string(),
    })
    .unwrap();
    repo.insert_alarm(alarm).unwrap();
    for id in users {
        repo.insert_user(user(id)).unwrap();
    }
    repo
}

#[tokio::test]
async fn test_app_alert_is_sent_once_per_repeat_window() {
    let h = Harness::start(
        repo(alarm(AlarmType::App, Status::Active), &["u1"]),
        RecordingNotifier::default(),
    );
    let payload = event().to_payload().unwrap();

    h.publish(payload.clone()).await;
    h.settled(1).await;

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].channel, "app");
    assert_eq!(sent[0].to, "keyu1");
    let alerts = h.repo.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].status, AlertStatus::Sent);
    assert_eq!(alerts[0].alarm_id, "alarm-1");
    assert_eq!(alerts[0].user_id, "u1");

    h.publish(payload).await;
    h.settled(2).await;

    assert_eq!(h.notifier.sent().len(), 1);
    assert_eq!(h.repo.alert_count(), 1);
    h.stop().await;
}

#[tokio::test]
async fn test_disabled_alarm_sends_nothing() {
    let h = Harness::start(
        repo(alarm(AlarmType::App, Status::Disabled), &["u1"]),
        RecordingNotifier::default(),
    );

    h.publish(event().to_payload().unwrap()).await;
    h.settled(1).await;

    assert!(h.notifier.sent().is_empty());
    assert_eq!(h.repo.alert_count(), 0);
    assert_eq!(h.store.alarm_lists.load(Ordering::SeqCst), 1);
    h.stop().await;
}

#[tokio::test]
async fn test_event_without_device_is_dropped_before_lookups() {
    let h = Harness::start(
        repo(alarm(AlarmType::App, Status::Active), &["u1"]),
        RecordingNotifier::default(),
    );
    let mut message = EventMessage::from(event());
    message.device = None;

    h.publish(message.to_payload().unwrap()).await;
    h.settled(1).await;

    assert_eq!(h.store.org_reads.load(Ordering::SeqCst), 0);
    assert_eq!(h.store.alarm_lists.load(Ordering::SeqCst), 0);
    assert_eq!(h.queue.requeued(), 0);
    assert_eq!(h.repo.alert_count(), 0);
    h.stop().await;
}

#[tokio::test]
async fn test_org_lookup_failure_requeues_and_redelivery_succeeds() {
    let h = Harness::start_with(
        repo(alarm(AlarmType::App, Status::Active), &["u1"]),
        RecordingNotifier::default(),
        1,
        RateLimitConfig::default(),
    );

    h.publish(event().to_payload().unwrap()).await;
    h.settled(1).await;

    assert_eq!(h.queue.requeued(), 1);
    assert_eq!(h.store.org_reads.load(Ordering::SeqCst), 2);
    // Only the redelivery got as far as the alarm listing
    assert_eq!(h.store.alarm_lists.load(Ordering::SeqCst), 1);
    assert_eq!(h.repo.alert_count(), 1);
    h.stop().await;
}

#[tokio::test]
async fn test_one_failing_user_does_not_affect_the_others() {
    let h = Harness::start(
        repo(alarm(AlarmType::Email, Status::Active), &["u1", "u2", "u3"]),
        RecordingNotifier::failing_for("u2@acme.example"),
    );

    h.publish(event().to_payload().unwrap()).await;
    h.settled(1).await;

    let alerts = h.repo.alerts();
    assert_eq!(alerts.len(), 3);
    let errors: Vec<_> = alerts
        .iter()
        .filter(|a| a.status == AlertStatus::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].user_id, "u2");
    assert_eq!(errors[0].error, "provider error: u2@acme.example unreachable");
    assert_eq!(h.notifier.sent().len(), 2);
    assert_eq!(h.queue.requeued(), 0);
    h.stop().await;
}

#[tokio::test]
async fn test_unknown_alarm_type_is_an_error_alert() {
    let h = Harness::start(
        repo(alarm(AlarmType::Unspecified, Status::Active), &["u1"]),
        RecordingNotifier::default(),
    );

    h.publish(event().to_payload().unwrap()).await;
    h.settled(1).await;

    let alerts = h.repo.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].status, AlertStatus::Error);
    assert!(alerts[0].error.contains("unknown alarm type"));
    assert!(h.notifier.sent().is_empty());
    h.stop().await;
}

#[tokio::test]
async fn test_concurrent_duplicates_send_once() {
    let h = Harness::start(
        repo(alarm(AlarmType::Sms, Status::Active), &["u1"]),
        RecordingNotifier::default(),
    );
    let payload = event().to_payload().unwrap();

    for _ in 0..20 {
        h.publish(payload.clone()).await;
    }
    h.settled(20).await;

    assert_eq!(h.notifier.sent().len(), 1);
    assert_eq!(h.repo.alert_count(), 1);
    h.stop().await;
}

#[tokio::test]
async fn test_channel_sends_are_paced_across_workers() {
    let h = Harness::start_with(
        repo(alarm(AlarmType::Email, Status::Active), &["u1", "u2", "u3"]),
        RecordingNotifier::default(),
        0,
        RateLimitConfig {
            app_ms: 0,
            sms_ms: 0,
            email_ms: 50,
        },
    );

    h.publish(event().to_payload().unwrap()).await;
    h.settled(1).await;

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 3);
    assert!(sent[2].at.duration_since(sent[0].at) >= Duration::from_millis(100));
    h.stop().await;
}
