//! PostgreSQL Event Channel
//!
//! Implements [`EventChannel`] on top of [`MessageRepository`]. Publishing
//! inserts a row; every subscribed topic gets a pool of workers that claim
//! ready rows one at a time and hand them to the handler.
//!
//! Any process that can reach the database can feed the workflow, either
//! through [`EventChannel::publish`] or with a plain
//! `INSERT INTO workflow_messages (id, topic, payload)`.
//!
//! | Handler result                      | Row afterwards                        |
//! |-------------------------------------|---------------------------------------|
//! | `Ok`                                | acknowledged                          |
//! | `Retry`, attempts left              | ready again after the policy's delay  |
//! | `Retry` exhausted, or `Reject`      | moved to `<topic>.dlq`                |
//! | worker dies mid-delivery            | ready again after the visibility timeout |
//!
//! Retries and dead letters are rows, so nothing is lost on restart.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::{watch, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use core_kernel::MessageId;
use infra_messaging::{
    dead_letter_topic, ChannelError, DeliveryError, EventChannel, Message, MessageHandler,
    RedeliveryPolicy,
};

use crate::error::DatabaseError;
use crate::repositories::message::{MessageRepository, MessageRow};

/// Settings for [`PostgresEventChannel`]
#[derive(Debug, Clone)]
pub struct PostgresChannelConfig {
    /// Workers spawned per subscribed topic
    pub worker_concurrency: usize,
    pub redelivery: RedeliveryPolicy,
    /// Sleep between claims when a topic has nothing ready
    pub poll_interval: Duration,
    /// How long a claimed message stays hidden from other workers
    pub visibility_timeout: Duration,
}

impl Default for PostgresChannelConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: 8,
            redelivery: RedeliveryPolicy::default(),
            poll_interval: Duration::from_millis(500),
            visibility_timeout: Duration::from_secs(30),
        }
    }
}

struct Inner {
    repository: MessageRepository,
    config: PostgresChannelConfig,
    subscribed: RwLock<HashSet<String>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    /// Wakes idle workers of this process after a local publish
    published: Notify,
    shutdown_tx: watch::Sender<bool>,
    closed: AtomicBool,
}

/// Durable [`EventChannel`] backed by the `workflow_messages` table
#[derive(Clone)]
pub struct PostgresEventChannel {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for PostgresEventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresEventChannel")
            .field("config", &self.inner.config)
            .field("closed", &self.inner.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl PostgresEventChannel {
    pub fn new(pool: PgPool, config: PostgresChannelConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                repository: MessageRepository::new(pool),
                config,
                subscribed: RwLock::new(HashSet::new()),
                workers: Mutex::new(Vec::new()),
                published: Notify::new(),
                shutdown_tx,
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &PostgresChannelConfig {
        &self.inner.config
    }

    pub fn repository(&self) -> &MessageRepository {
        &self.inner.repository
    }

    /// Unacknowledged messages on `topic`, including ones being delivered
    pub async fn pending(&self, topic: &str) -> Result<Vec<Message>, DatabaseError> {
        let rows = self.inner.repository.list_unacked(topic).await?;
        Ok(rows.into_iter().map(to_message).collect())
    }

    /// Messages waiting on the dead-letter topic of `topic`
    pub async fn dead_letters(&self, topic: &str) -> Result<Vec<Message>, DatabaseError> {
        self.pending(&dead_letter_topic(topic)).await
    }

    /// Waits until no subscribed topic has an unacknowledged message
    ///
    /// Returns false if `timeout` elapses first.
    pub async fn wait_until_idle(&self, timeout: Duration) -> bool {
        let poll = async {
            loop {
                let topics: Vec<String> =
                    self.inner.subscribed.read().await.iter().cloned().collect();
                match self.inner.repository.count_unacked(&topics).await {
                    Ok(0) => return,
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "Failed to count pending messages"),
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        };
        tokio::time::timeout(timeout, poll).await.is_ok()
    }

    /// Deletes messages acknowledged longer than `retention` ago
    pub async fn purge_acknowledged(&self, retention: Duration) -> Result<u64, DatabaseError> {
        let retention = chrono::Duration::from_std(retention)
            .map_err(|e| DatabaseError::QueryFailed(format!("retention out of range: {}", e)))?;
        let deleted = self
            .inner
            .repository
            .purge_acked_before(Utc::now() - retention)
            .await?;
        if deleted > 0 {
            info!(deleted, "Purged acknowledged workflow messages");
        }
        Ok(deleted)
    }

    /// Stops the workers once their current delivery is done
    ///
    /// Messages not yet claimed stay in the table for the next start. A
    /// delivery still running at `timeout` is abandoned and becomes ready
    /// again when its visibility timeout expires. Returns false in that case.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        let _ = self.inner.shutdown_tx.send(true);
        let workers: Vec<_> = self.inner.workers.lock().await.drain(..).collect();
        let count = workers.len();

        let join = async {
            for worker in workers {
                if let Err(e) = worker.await {
                    warn!(error = %e, "Channel worker ended abnormally");
                }
            }
        };
        let stopped = tokio::time::timeout(timeout, join).await.is_ok();
        if !stopped {
            warn!(
                timeout_ms = timeout.as_millis() as u64,
                "Channel workers still busy at deadline, in-flight messages will be redelivered"
            );
        }

        self.inner.closed.store(true, Ordering::SeqCst);
        info!(workers = count, stopped, "Event channel shut down");
        stopped
    }

    fn ensure_open(&self) -> Result<(), ChannelError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            Err(ChannelError::Closed)
        } else {
            Ok(())
        }
    }
}

fn to_message(row: MessageRow) -> Message {
    Message {
        id: MessageId::from_uuid(row.id),
        topic: row.topic,
        payload: row.payload,
        attempt: u32::try_from(row.attempt).unwrap_or(0),
        published_at: row.published_at,
        last_error: row.last_error,
    }
}

async fn run_worker(
    inner: Arc<Inner>,
    topic: String,
    handler: Arc<dyn MessageHandler>,
    mut shutdown: watch::Receiver<bool>,
) {
    let visibility = inner.config.visibility_timeout;
    loop {
        if *shutdown.borrow() {
            break;
        }

        match inner.repository.claim_next(&topic, visibility).await {
            Ok(Some(row)) => {
                deliver(&inner, handler.as_ref(), to_message(row)).await;
                continue;
            }
            Ok(None) => {}
            Err(e) => error!(topic = %topic, error = %e, "Failed to claim message"),
        }

        tokio::select! {
            _ = inner.published.notified() => {}
            _ = tokio::time::sleep(inner.config.poll_interval) => {}
            _ = shutdown.changed() => break,
        }
    }
}

async fn deliver(inner: &Inner, handler: &dyn MessageHandler, message: Message) {
    let id = *message.id.as_uuid();

    let settled = match handler.handle(&message).await {
        Ok(()) => {
            debug!(message_id = %message.id, topic = %message.topic, attempt = message.attempt, "Message acknowledged");
            inner.repository.ack(id).await
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
            inner.repository.reschedule(id, delay, &reason).await
        }
        Err(e) => {
            let reason = e.to_string();
            error!(
                message_id = %message.id,
                topic = %message.topic,
                attempt = message.attempt,
                reason = %reason,
                "Routing message to dead-letter queue"
            );
            inner
                .repository
                .dead_letter(id, &dead_letter_topic(&message.topic), &reason)
                .await
        }
    };

    if let Err(e) = settled {
        error!(
            message_id = %message.id,
            topic = %message.topic,
            error = %e,
            "Failed to record delivery outcome, message will be redelivered"
        );
    }
}

#[async_trait]
impl EventChannel for PostgresEventChannel {
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<MessageId, ChannelError> {
        self.ensure_open()?;
        let message = Message::new(topic, payload);
        let row = MessageRow {
            id: *message.id.as_uuid(),
            topic: message.topic,
            payload: message.payload,
            attempt: 0,
            last_error: None,
            published_at: message.published_at,
        };

        self.inner
            .repository
            .insert(&row)
            .await
            .map_err(|e| ChannelError::PublishFailed {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;
        self.inner.published.notify_waiters();

        debug!(message_id = %message.id, topic, "Message published");
        Ok(message.id)
    }

    async fn subscribe(&self, topic: &str, handler: Arc<dyn MessageHandler>) -> Result<(), ChannelError> {
        self.ensure_open()?;
        if !self.inner.subscribed.write().await.insert(topic.to_string()) {
            return Err(ChannelError::AlreadySubscribed(topic.to_string()));
        }

        let concurrency = self.inner.config.worker_concurrency.max(1);
        let mut workers = self.inner.workers.lock().await;
        for _ in 0..concurrency {
            workers.push(tokio::spawn(run_worker(
                Arc::clone(&self.inner),
                topic.to_string(),
                Arc::clone(&handler),
                self.inner.shutdown_tx.subscribe(),
            )));
        }
        info!(topic, workers = concurrency, "Subscribed to topic");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_maps_to_message() {
        let id = uuid::Uuid::now_v7();
        let message = to_message(MessageRow {
            id,
            topic: "payment.confirmed".into(),
            payload: serde_json::json!({"request_id": "r"}),
            attempt: 2,
            last_error: Some("timeout".into()),
            published_at: Utc::now(),
        });

        assert_eq!(message.id.as_uuid(), &id);
        assert_eq!(message.attempt, 2);
        assert!(message.is_redelivery());
        assert_eq!(message.last_error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_default_config() {
        let config = PostgresChannelConfig::default();
        assert_eq!(config.worker_concurrency, 8);
        assert!(config.visibility_timeout > config.poll_interval);
    }
}
