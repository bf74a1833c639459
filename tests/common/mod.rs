//! In-memory stand-ins for the broker, stores and transports.

#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use notification_dispatch::{
    clients::{AuditSink, ChatBot, IdempotencyStore, Mailer, NotificationStore, ProfileDirectory},
    config::{DecodeFailurePolicy, ServiceConfig},
    error::{DirectoryError, HandlerError, QueueError, StoreError, TransportError},
    models::{
        audit::CreateAuditLog,
        notification::Notification,
        profile::{Channel, Profile},
        status::IdempotencyStatus,
        task::Task,
    },
    queue::{MessageHandler, Queue},
    service::NotificationService,
    worker::TaskDispatcher,
};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Vec<u8>>,
    published: Vec<Vec<u8>>,
    acked: Vec<Vec<u8>>,
    nacked: usize,
    dead_letters: Vec<(Vec<u8>, String)>,
    closed: bool,
    failing_kinds: HashSet<String>,
    fail_all: bool,
}

/// Broker double with ack / requeue / dead-letter bookkeeping.
#[derive(Default)]
pub struct InMemoryQueue {
    state: Mutex<QueueState>,
    ready: Notify,
}

impl InMemoryQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Rejects every publish of the given task kind.
    pub fn fail_publishes_of(&self, kind: &str) {
        self.state.lock().unwrap().failing_kinds.insert(kind.to_string());
    }

    pub fn fail_all_publishes(&self) {
        self.state.lock().unwrap().fail_all = true;
    }

    pub fn close(&self) {
        self.state.lock().unwrap().closed = true;
        self.ready.notify_one();
    }

    pub fn published_tasks(&self) -> Vec<Task> {
        self.state
            .lock()
            .unwrap()
            .published
            .iter()
            .map(|payload| Task::decode(payload).unwrap())
            .collect()
    }

    pub fn published_kinds(&self) -> Vec<&'static str> {
        self.published_tasks().iter().map(Task::kind).collect()
    }

    pub fn acked(&self) -> usize {
        self.state.lock().unwrap().acked.len()
    }

    pub fn nacked(&self) -> usize {
        self.state.lock().unwrap().nacked
    }

    pub fn pending(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    pub fn dead_letters(&self) -> Vec<(Vec<u8>, String)> {
        self.state.lock().unwrap().dead_letters.clone()
    }

    /// Puts a raw payload on the queue, bypassing publish checks.
    pub fn inject(&self, payload: &[u8]) {
        self.state.lock().unwrap().pending.push_back(payload.to_vec());
        self.ready.notify_one();
    }

    async fn next_delivery(&self) -> Result<Vec<u8>, QueueError> {
        loop {
            {
                let mut state = self.state.lock().unwrap();
                if let Some(payload) = state.pending.pop_front() {
                    return Ok(payload);
                }
                if state.closed {
                    return Err(QueueError::ChannelClosed);
                }
            }
            self.ready.notified().await;
        }
    }
}

#[async_trait]
impl Queue for InMemoryQueue {
    async fn publish(&self, payload: &[u8]) -> Result<(), QueueError> {
        let kind = serde_json::from_slice::<serde_json::Value>(payload)
            .ok()
            .and_then(|v| v["type"].as_str().map(str::to_string))
            .unwrap_or_default();

        {
            let mut state = self.state.lock().unwrap();
            if state.fail_all || state.failing_kinds.contains(&kind) {
                return Err(QueueError::Publish(format!("{} rejected", kind)));
            }
            state.published.push(payload.to_vec());
            state.pending.push_back(payload.to_vec());
        }
        self.ready.notify_one();
        Ok(())
    }

    async fn consume(
        &self,
        handler: &dyn MessageHandler,
        cancel: CancellationToken,
    ) -> Result<(), QueueError> {
        loop {
            let payload = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                next = self.next_delivery() => next?,
            };

            match handler.handle(&payload).await {
                Ok(()) => self.state.lock().unwrap().acked.push(payload),
                Err(HandlerError::Poison(reason)) => {
                    self.state.lock().unwrap().dead_letters.push((payload, reason))
                }
                Err(_) => {
                    {
                        let mut state = self.state.lock().unwrap();
                        state.nacked += 1;
                        state.pending.push_front(payload);
                    }
                    tokio::task::yield_now().await;
                }
            }
        }
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    rows: Mutex<Vec<Notification>>,
    fail_inserts: AtomicBool,
    fail_mark_read: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_inserts(&self) {
        self.fail_inserts.store(true, Ordering::SeqCst);
    }

    pub fn fail_mark_read(&self) {
        self.fail_mark_read.store(true, Ordering::SeqCst);
    }

    pub fn rows(&self) -> Vec<Notification> {
        self.rows.lock().unwrap().clone()
    }

    pub fn seed(&self, notification: Notification) {
        self.rows.lock().unwrap().push(notification);
    }
}

#[async_trait]
impl NotificationStore for InMemoryStore {
    async fn all(&self) -> Result<Vec<Notification>, StoreError> {
        Ok(self.rows())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Notification>, StoreError> {
        Ok(self.rows().into_iter().find(|n| n.id == id))
    }

    async fn by_recipient(&self, user_id: &str) -> Result<Vec<Notification>, StoreError> {
        Ok(self
            .rows()
            .into_iter()
            .filter(|n| n.user_id == user_id)
            .collect())
    }

    async fn insert(&self, notification: &Notification) -> Result<(), StoreError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("insert refused".into()));
        }
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|n| n.id == notification.id) {
            return Err(StoreError::Backend("duplicate id".into()));
        }
        rows.push(notification.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.rows.lock().unwrap().retain(|n| n.id != id);
        Ok(())
    }

    async fn mark_read(&self, id: Uuid) -> Result<bool, StoreError> {
        if self.fail_mark_read.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("update refused".into()));
        }
        let mut rows = self.rows.lock().unwrap();
        match rows.iter_mut().find(|n| n.id == id && n.is_new) {
            Some(row) => {
                row.is_new = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct RecordingAudit {
    entries: Mutex<Vec<CreateAuditLog>>,
    failures_remaining: AtomicUsize,
}

impl RecordingAudit {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next(&self, times: usize) {
        self.failures_remaining.store(times, Ordering::SeqCst);
    }

    pub fn entries(&self) -> Vec<CreateAuditLog> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for RecordingAudit {
    async fn record(&self, entry: CreateAuditLog) -> Result<(), StoreError> {
        if take_failure(&self.failures_remaining) {
            return Err(StoreError::Backend("audit table unavailable".into()));
        }
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryIdempotency {
    statuses: Mutex<HashMap<String, IdempotencyStatus>>,
}

impl MemoryIdempotency {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn get(&self, key: &str) -> Option<IdempotencyStatus> {
        self.statuses.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, status: IdempotencyStatus) -> Result<(), StoreError> {
        self.statuses.lock().unwrap().insert(key.to_string(), status);
        Ok(())
    }
}

#[async_trait]
impl IdempotencyStore for MemoryIdempotency {
    async fn status(&self, key: &str) -> Result<IdempotencyStatus, StoreError> {
        Ok(self.get(key).unwrap_or(IdempotencyStatus::NotFound))
    }

    async fn mark_processing(&self, key: &str) -> Result<(), StoreError> {
        self.set(key, IdempotencyStatus::Processing)
    }

    async fn mark_sent(&self, key: &str) -> Result<(), StoreError> {
        self.set(key, IdempotencyStatus::Sent)
    }

    async fn mark_failed(&self, key: &str) -> Result<(), StoreError> {
        self.set(key, IdempotencyStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
    attempts: AtomicUsize,
    failures_remaining: AtomicUsize,
}

impl RecordingMailer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next(&self, times: usize) {
        self.failures_remaining.store(times, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !to.contains('@') {
            return Err(TransportError::InvalidRecipient(format!("{}: missing domain", to)));
        }
        if take_failure(&self.failures_remaining) {
            return Err(TransportError::Smtp("421 service not available".into()));
        }
        self.sent.lock().unwrap().push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingBot {
    sent: Mutex<Vec<(i64, String, String)>>,
    fail: AtomicBool,
    panic: AtomicBool,
    delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingBot {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let bot = Self::default();
        bot.fail.store(true, Ordering::SeqCst);
        Arc::new(bot)
    }

    pub fn panicking() -> Arc<Self> {
        let bot = Self::default();
        bot.panic.store(true, Ordering::SeqCst);
        Arc::new(bot)
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        let bot = Self::default();
        *bot.delay.lock().unwrap() = Some(delay);
        Arc::new(bot)
    }

    pub fn sent(&self) -> Vec<(i64, String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatBot for RecordingBot {
    async fn send_message(&self, chat_id: i64, title: &str, body: &str) -> Result<(), TransportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panic.load(Ordering::SeqCst) {
            panic!("bot transport blew up for chat {}", chat_id);
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::Status {
                service: "bot api",
                status: 502,
                body: "Bad Gateway".into(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((chat_id, title.to_string(), body.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeDirectory {
    profiles: HashMap<String, Profile>,
    deny_token: bool,
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn denying_token() -> Self {
        Self {
            deny_token: true,
            ..Self::default()
        }
    }

    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profiles.insert(profile.id.clone(), profile);
        self
    }
}

#[async_trait]
impl ProfileDirectory for FakeDirectory {
    async fn access_token(&self) -> Result<String, DirectoryError> {
        if self.deny_token {
            return Err(DirectoryError::Status {
                status: 401,
                body: "invalid_client".into(),
            });
        }
        Ok("test-token".into())
    }

    async fn profile(&self, token: &str, user_id: &str) -> Result<Profile, DirectoryError> {
        assert_eq!(token, "test-token");
        self.profiles
            .get(user_id)
            .cloned()
            .ok_or_else(|| DirectoryError::Status {
                status: 404,
                body: format!("user {} not found", user_id),
            })
    }
}

pub fn profile(id: &str, channels: &[&str]) -> Profile {
    Profile {
        id: id.to_string(),
        email: Some(format!("{}@example.com", id)),
        channels: channels.iter().map(|c| Channel::from(*c)).collect(),
        chat_ids: vec!["4242".to_string()],
    }
}

pub fn service(queue: Arc<InMemoryQueue>, store: Arc<InMemoryStore>) -> Arc<NotificationService> {
    service_with(queue, store, ServiceConfig::default())
}

pub fn service_with(
    queue: Arc<InMemoryQueue>,
    store: Arc<InMemoryStore>,
    config: ServiceConfig,
) -> Arc<NotificationService> {
    Arc::new(NotificationService::new(queue, store, config))
}

pub struct DispatcherParts {
    pub mailer: Arc<RecordingMailer>,
    pub idempotency: Arc<MemoryIdempotency>,
    pub audit: Arc<RecordingAudit>,
}

impl DispatcherParts {
    pub fn new() -> Self {
        Self {
            mailer: RecordingMailer::new(),
            idempotency: MemoryIdempotency::new(),
            audit: RecordingAudit::new(),
        }
    }

    pub fn dispatcher(&self, policy: DecodeFailurePolicy) -> TaskDispatcher {
        TaskDispatcher::new(
            self.mailer.clone(),
            self.idempotency.clone(),
            self.audit.clone(),
            policy,
        )
    }
}

fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Polls `condition` every few milliseconds, panicking after two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
