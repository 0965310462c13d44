//! In-process event channel
//!
//! Each topic owns a FIFO queue. Subscribing spawns a pool of workers that
//! drain the queue concurrently. A handler asking for a retry gets the
//! message back after the policy's backoff; once the attempts are used up,
//! or when the handler rejects, the message moves to the topic's
//! dead-letter queue, where it can be inspected or consumed like any other
//! topic.
//!
//! Queues live as long as the channel, so messages published before a
//! subscriber attaches are not lost. Nothing survives the process: use
//! `infra_db::PostgresEventChannel` where messages must outlive a restart.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use core_kernel::MessageId;

use crate::channel::{dead_letter_topic, DeliveryError, EventChannel, Message, MessageHandler};
use crate::error::ChannelError;
use crate::retry::RedeliveryPolicy;

/// Settings for [`InMemoryEventChannel`]
#[derive(Debug, Clone)]
pub struct InMemoryChannelConfig {
    /// Workers spawned per subscribed topic
    pub worker_concurrency: usize,
    pub redelivery: RedeliveryPolicy,
}

impl Default for InMemoryChannelConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: 8,
            redelivery: RedeliveryPolicy::default(),
        }
    }
}

#[derive(Debug, Default)]
struct TopicQueue {
    messages: Mutex<VecDeque<Message>>,
    notify: Notify,
    /// Messages enqueued and not yet acknowledged or dead-lettered
    outstanding: AtomicUsize,
    subscribed: AtomicBool,
}

impl TopicQueue {
    async fn enqueue(&self, message: Message) {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        self.requeue(message).await;
    }

    async fn requeue(&self, message: Message) {
        self.messages.lock().await.push_back(message);
        self.notify.notify_one();
    }

    async fn pop(&self) -> Option<Message> {
        self.messages.lock().await.pop_front()
    }

    fn settle(&self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }

}

struct Inner {
    config: InMemoryChannelConfig,
    topics: RwLock<HashMap<String, Arc<TopicQueue>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
    closed: AtomicBool,
}

impl Inner {
    async fn queue(&self, topic: &str) -> Arc<TopicQueue> {
        if let Some(queue) = self.topics.read().await.get(topic) {
            return Arc::clone(queue);
        }
        let mut topics = self.topics.write().await;
        Arc::clone(topics.entry(topic.to_string()).or_default())
    }

    async fn dead_letter(&self, mut message: Message, reason: String) {
        let dlq = dead_letter_topic(&message.topic);
        error!(
            message_id = %message.id,
            topic = %message.topic,
            attempt = message.attempt,
            reason = %reason,
            "Routing message to dead-letter queue"
        );
        message.last_error = Some(reason);
        message.topic = dlq.clone();
        self.queue(&dlq).await.enqueue(message).await;
    }
}

/// In-process [`EventChannel`] backed by per-topic queues
#[derive(Clone)]
pub struct InMemoryEventChannel {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for InMemoryEventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventChannel")
            .field("config", &self.inner.config)
            .field("closed", &self.inner.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl Default for InMemoryEventChannel {
    fn default() -> Self {
        Self::new(InMemoryChannelConfig::default())
    }
}

impl InMemoryEventChannel {
    pub fn new(config: InMemoryChannelConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                config,
                topics: RwLock::new(HashMap::new()),
                workers: Mutex::new(Vec::new()),
                shutdown_tx,
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &InMemoryChannelConfig {
        &self.inner.config
    }

    /// Messages currently waiting on `topic`
    pub async fn pending(&self, topic: &str) -> Vec<Message> {
        match self.inner.topics.read().await.get(topic) {
            Some(queue) => queue.messages.lock().await.iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Messages waiting on the dead-letter topic of `topic`
    pub async fn dead_letters(&self, topic: &str) -> Vec<Message> {
        self.pending(&dead_letter_topic(topic)).await
    }

    /// Waits until every subscribed topic has no outstanding message
    ///
    /// Returns false if `timeout` elapses first.
    pub async fn wait_until_idle(&self, timeout: Duration) -> bool {
        let poll = async {
            loop {
                if self.outstanding().await == 0 {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(timeout, poll).await.is_ok()
    }

    /// Drains subscribed topics, then stops the workers
    ///
    /// Deliveries keep running until every subscribed topic is idle or
    /// `drain_timeout` elapses, so redeliveries waiting on their backoff and
    /// follow-up messages published by handlers are processed too. Returns
    /// false when messages were still outstanding at the deadline.
    pub async fn shutdown(&self, drain_timeout: Duration) -> bool {
        let drained = self.wait_until_idle(drain_timeout).await;
        if !drained {
            warn!(
                outstanding = self.outstanding().await,
                timeout_ms = drain_timeout.as_millis() as u64,
                "Channel not drained before deadline, dropping outstanding messages"
            );
        }

        self.inner.closed.store(true, Ordering::SeqCst);
        let _ = self.inner.shutdown_tx.send(true);
        let workers: Vec<_> = self.inner.workers.lock().await.drain(..).collect();
        let count = workers.len();
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "Channel worker ended abnormally");
            }
        }
        info!(workers = count, drained, "Event channel shut down");
        drained
    }

    /// Messages on subscribed topics not yet acknowledged or dead-lettered
    async fn outstanding(&self) -> usize {
        self.inner
            .topics
            .read()
            .await
            .values()
            .filter(|q| q.subscribed.load(Ordering::SeqCst))
            .map(|q| q.outstanding.load(Ordering::SeqCst))
            .sum()
    }

    fn ensure_open(&self) -> Result<(), ChannelError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            Err(ChannelError::Closed)
        } else {
            Ok(())
        }
    }
}

async fn run_worker(
    inner: Arc<Inner>,
    queue: Arc<TopicQueue>,
    handler: Arc<dyn MessageHandler>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        if let Some(message) = queue.pop().await {
            deliver(&inner, &queue, handler.as_ref(), message).await;
            continue;
        }
        tokio::select! {
            _ = queue.notify.notified() => {}
            _ = shutdown.changed() => break,
        }
    }
}

async fn deliver(inner: &Arc<Inner>, queue: &Arc<TopicQueue>, handler: &dyn MessageHandler, mut message: Message) {
    message.attempt += 1;

    match handler.handle(&message).await {
        Ok(()) => {
            debug!(message_id = %message.id, topic = %message.topic, attempt = message.attempt, "Message acknowledged");
            queue.settle();
        }
        Err(DeliveryError::Retry(reason)) if inner.config.redelivery.should_retry(message.attempt) => {
            let delay = inner.config.redelivery.delay_for_attempt(message.attempt);
            warn!(
                message_id = %message.id,
                topic = %message.topic,
                attempt = message.attempt,
                delay_ms = delay.as_millis() as u64,
                reason = %reason,
                "Delivery failed, scheduling redelivery"
            );
            message.last_error = Some(reason);
            let queue = Arc::clone(queue);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                queue.requeue(message).await;
            });
        }
        Err(e) => {
            let reason = e.to_string();
            inner.dead_letter(message, reason).await;
            queue.settle();
        }
    }
}

#[async_trait]
impl EventChannel for InMemoryEventChannel {
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<MessageId, ChannelError> {
        self.ensure_open()?;
        let message = Message::new(topic, payload);
        let id = message.id;
        self.inner.queue(topic).await.enqueue(message).await;
        debug!(message_id = %id, topic, "Message published");
        Ok(id)
    }

    async fn subscribe(&self, topic: &str, handler: Arc<dyn MessageHandler>) -> Result<(), ChannelError> {
        self.ensure_open()?;
        let queue = self.inner.queue(topic).await;
        if queue.subscribed.swap(true, Ordering::SeqCst) {
            return Err(ChannelError::AlreadySubscribed(topic.to_string()));
        }

        let concurrency = self.inner.config.worker_concurrency.max(1);
        let mut workers = self.inner.workers.lock().await;
        for _ in 0..concurrency {
            workers.push(tokio::spawn(run_worker(
                Arc::clone(&self.inner),
                Arc::clone(&queue),
                Arc::clone(&handler),
                self.inner.shutdown_tx.subscribe(),
            )));
        }
        info!(topic, workers = concurrency, "Subscribed to topic");
        Ok(())
    }
}
