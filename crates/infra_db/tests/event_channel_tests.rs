//! PostgreSQL Event Channel Tests
//!
//! Runs the durable channel against a real PostgreSQL started with
//! testcontainers. These need a Docker daemon and are ignored by default:
//!
//! ```text
//! cargo test -p infra_db -- --ignored
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use infra_db::{PostgresChannelConfig, PostgresEventChannel};
use infra_messaging::{
    dead_letter_topic, ChannelError, DeliveryError, EventChannel, Message, MessageHandler,
    RedeliveryPolicy,
};
use serde_json::json;
use test_utils::TestDatabase;
use tokio::sync::Mutex;
use uuid::Uuid;

const WAIT: Duration = Duration::from_secs(10);

/// Records every delivery and fails the first `fail_first` of them
#[derive(Default)]
struct RecordingHandler {
    fail_first: u32,
    calls: AtomicU32,
    seen: Mutex<Vec<Message>>,
}

impl RecordingHandler {
    fn ok() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn failing(times: u32) -> Arc<Self> {
        Arc::new(Self {
            fail_first: times,
            ..Default::default()
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn handle(&self, message: &Message) -> Result<(), DeliveryError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen.lock().await.push(message.clone());
        if call <= self.fail_first {
            return Err(DeliveryError::retry("upstream unavailable"));
        }
        Ok(())
    }
}

fn fast_config(max_attempts: u32) -> PostgresChannelConfig {
    PostgresChannelConfig {
        worker_concurrency: 2,
        redelivery: RedeliveryPolicy::builder()
            .max_attempts(max_attempts)
            .initial_delay(Duration::from_millis(10))
            .max_delay(Duration::from_millis(50))
            .build(),
        poll_interval: Duration::from_millis(20),
        visibility_timeout: Duration::from_secs(5),
    }
}

async fn setup(max_attempts: u32) -> (TestDatabase, PostgresEventChannel) {
    let db = TestDatabase::start()
        .await
        .expect("Failed to start test database");
    let channel = PostgresEventChannel::new(db.pool().clone(), fast_config(max_attempts));
    (db, channel)
}

// ============================================================================
// DELIVERY
// ============================================================================

mod delivery {
    use super::*;

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_published_message_is_delivered_and_acknowledged() {
        let (_db, channel) = setup(3).await;
        let handler = RecordingHandler::ok();
        channel.subscribe("policy-request.received", handler.clone()).await.unwrap();

        let id = channel
            .publish("policy-request.received", json!({"request_id": "abc"}))
            .await
            .unwrap();

        assert!(channel.wait_until_idle(WAIT).await);
        let seen = handler.seen.lock().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].id, id);
        assert_eq!(seen[0].attempt, 1);
        assert!(channel.pending("policy-request.received").await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_row_inserted_by_another_producer_is_delivered() {
        let (db, channel) = setup(3).await;
        sqlx::query("INSERT INTO workflow_messages (id, topic, payload) VALUES ($1, $2, $3)")
            .bind(Uuid::now_v7())
            .bind("payment.confirmed")
            .bind(json!({"request_id": "r-1"}))
            .execute(db.pool())
            .await
            .unwrap();

        let handler = RecordingHandler::ok();
        channel.subscribe("payment.confirmed", handler.clone()).await.unwrap();

        assert!(channel.wait_until_idle(WAIT).await);
        assert_eq!(handler.calls(), 1);
        assert_eq!(handler.seen.lock().await[0].payload["request_id"], "r-1");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "requires Docker"]
    async fn test_two_workers_sharing_a_database_deliver_each_message_once() {
        let (db, first) = setup(3).await;
        let second = PostgresEventChannel::new(db.pool().clone(), fast_config(3));
        let handler = RecordingHandler::ok();
        first.subscribe("bulk", handler.clone()).await.unwrap();
        second.subscribe("bulk", handler.clone()).await.unwrap();

        for n in 0..50 {
            first.publish("bulk", json!({ "n": n })).await.unwrap();
        }

        assert!(first.wait_until_idle(WAIT).await);
        assert_eq!(handler.calls(), 50);

        let mut ids: Vec<_> = handler.seen.lock().await.iter().map(|m| m.id).collect();
        ids.sort_by_key(|id| *id.as_uuid());
        ids.dedup();
        assert_eq!(ids.len(), 50);
    }
}

// ============================================================================
// REDELIVERY AND DEAD LETTERS
// ============================================================================

mod redelivery {
    use super::*;

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_retry_then_success() {
        let (_db, channel) = setup(5).await;
        let handler = RecordingHandler::failing(2);
        channel.subscribe("t", handler.clone()).await.unwrap();
        channel.publish("t", json!({})).await.unwrap();

        assert!(channel.wait_until_idle(WAIT).await);
        let seen = handler.seen.lock().await;
        let attempts: Vec<_> = seen.iter().map(|m| m.attempt).collect();
        assert_eq!(attempts, vec![1, 2, 3]);
        assert_eq!(seen[2].last_error.as_deref(), Some("upstream unavailable"));
        assert!(channel.dead_letters("t").await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_exhausted_retries_move_to_dlq() {
        let (_db, channel) = setup(3).await;
        let handler = RecordingHandler::failing(u32::MAX);
        channel.subscribe("t", handler.clone()).await.unwrap();
        let id = channel.publish("t", json!({"k": 1})).await.unwrap();

        assert!(channel.wait_until_idle(WAIT).await);
        assert_eq!(handler.calls(), 3);

        let dead = channel.dead_letters("t").await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].id, id);
        assert_eq!(dead[0].topic, dead_letter_topic("t"));
        assert_eq!(dead[0].attempt, 3);
        assert!(dead[0].last_error.as_deref().unwrap().contains("upstream unavailable"));
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_unacknowledged_claim_becomes_ready_after_visibility_timeout() {
        let (_db, channel) = setup(3).await;
        channel.publish("t", json!({})).await.unwrap();
        let repository = channel.repository();

        let first = repository
            .claim_next("t", Duration::from_millis(200))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.attempt, 1);
        assert!(repository.claim_next("t", Duration::from_millis(200)).await.unwrap().is_none());

        tokio::time::sleep(Duration::from_millis(400)).await;
        let second = repository
            .claim_next("t", Duration::from_millis(200))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.attempt, 2);
    }
}

// ============================================================================
// LIFECYCLE
// ============================================================================

mod lifecycle {
    use super::*;

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_second_subscriber_is_refused() {
        let (_db, channel) = setup(3).await;
        channel.subscribe("t", RecordingHandler::ok()).await.unwrap();
        let err = channel.subscribe("t", RecordingHandler::ok()).await.unwrap_err();
        assert!(matches!(err, ChannelError::AlreadySubscribed(topic) if topic == "t"));
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_messages_survive_shutdown_for_the_next_worker() {
        let (db, channel) = setup(3).await;
        assert!(channel.shutdown(WAIT).await);
        assert!(matches!(channel.publish("t", json!({})).await, Err(ChannelError::Closed)));

        let producer = PostgresEventChannel::new(db.pool().clone(), fast_config(3));
        producer.publish("t", json!({"n": 1})).await.unwrap();
        assert!(producer.shutdown(WAIT).await);

        let restarted = PostgresEventChannel::new(db.pool().clone(), fast_config(3));
        let handler = RecordingHandler::ok();
        restarted.subscribe("t", handler.clone()).await.unwrap();

        assert!(restarted.wait_until_idle(WAIT).await);
        assert_eq!(handler.calls(), 1);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_purge_keeps_recent_and_unacknowledged_messages() {
        let (db, channel) = setup(3).await;
        channel.subscribe("t", RecordingHandler::ok()).await.unwrap();
        channel.publish("t", json!({})).await.unwrap();
        channel.publish("other", json!({})).await.unwrap();
        assert!(channel.wait_until_idle(WAIT).await);

        assert_eq!(channel.purge_acknowledged(Duration::from_secs(3600)).await.unwrap(), 0);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(channel.purge_acknowledged(Duration::ZERO).await.unwrap(), 1);

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM workflow_messages")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(remaining, 1);
    }
}
