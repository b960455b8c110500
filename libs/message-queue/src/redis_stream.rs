use std::collections::VecDeque;

use async_trait::async_trait;
use bytes::Bytes;
use deadpool_redis::Pool;
use redis::streams::{StreamAutoClaimReply, StreamId, StreamReadReply};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::{Delivery, MessageQueue, QueueConfig, QueueResult, Subscription};

const KEY_FIELD: &str = "key";
const PAYLOAD_FIELD: &str = "payload";

/// Redis Streams backend. One stream per topic, one Redis consumer group per
/// queue group.
#[derive(Clone)]
pub struct RedisStreamQueue {
    pool: Pool,
    config: QueueConfig,
}

impl RedisStreamQueue {
    pub fn new(pool: Pool, config: QueueConfig) -> Self {
        Self { pool, config }
    }

    async fn ensure_group(&self, topic: &str, group: &str) -> QueueResult<()> {
        let mut conn = self.pool.get().await?;
        let created: redis::RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(topic)
            .arg(group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match created {
            Ok(()) => {
                info!(topic, group, "created consumer group");
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl MessageQueue for RedisStreamQueue {
    #[instrument(skip(self, payload))]
    async fn publish(
        &self, topic: &str, key: &str, payload: Bytes,
    ) -> QueueResult<String> {
        let mut conn = self.pool.get().await?;
        let mut cmd = redis::cmd("XADD");
        cmd.arg(topic);
        if self.config.max_len > 0 {
            cmd.arg("MAXLEN").arg("~").arg(self.config.max_len);
        }
        let id: String = cmd
            .arg("*")
            .arg(KEY_FIELD)
            .arg(key)
            .arg(PAYLOAD_FIELD)
            .arg(payload.as_ref())
            .query_async(&mut conn)
            .await?;
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn subscribe(
        &self, topic: &str, group: &str, consumer: &str,
    ) -> QueueResult<Box<dyn Subscription>> {
        self.ensure_group(topic, group).await?;

        Ok(Box::new(RedisStreamSubscription {
            pool: self.pool.clone(),
            topic: topic.to_string(),
            group: group.to_string(),
            consumer: consumer.to_string(),
            config: self.config.clone(),
            pending_cursor: Some("0".to_string()),
            claim_cursor: START_ID.to_string(),
            next_claim: Instant::now(),
            buffered: VecDeque::new(),
        }))
    }

    #[instrument(skip(self))]
    async fn remove_group(&self, topic: &str, group: &str) -> QueueResult<()> {
        let mut conn = self.pool.get().await?;
        let removed: redis::RedisResult<u64> = redis::cmd("XGROUP")
            .arg("DESTROY")
            .arg(topic)
            .arg(group)
            .query_async(&mut conn)
            .await;

        match removed {
            Ok(n) => {
                if n > 0 {
                    info!(topic, group, "destroyed consumer group");
                }
                Ok(())
            }
            // The stream itself is gone, so the group is too.
            Err(e) if e.to_string().contains("key to exist") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

const START_ID: &str = "0-0";

/// Reads this consumer's own pending entries first, then new ones. Entries
/// another member left pending past `claim_idle_ms` are taken over on a
/// periodic sweep.
pub struct RedisStreamSubscription {
    pool: Pool,
    topic: String,
    group: String,
    consumer: String,
    config: QueueConfig,
    /// Position in the pending list while replaying; `None` once drained.
    pending_cursor: Option<String>,
    /// Where the current takeover sweep resumes.
    claim_cursor: String,
    next_claim: Instant,
    buffered: VecDeque<Delivery>,
}

impl RedisStreamSubscription {
    async fn read(&mut self) -> QueueResult<Vec<StreamId>> {
        let mut conn = self.pool.get().await?;
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(self.config.batch_size);

        let from = match &self.pending_cursor {
            Some(cursor) => cursor.clone(),
            None => {
                cmd.arg("BLOCK").arg(self.config.poll_interval_ms);
                ">".to_string()
            }
        };
        cmd.arg("STREAMS").arg(&self.topic).arg(&from);

        let reply: Option<StreamReadReply> = cmd.query_async(&mut conn).await?;
        Ok(reply
            .map(|r| r.keys.into_iter().flat_map(|k| k.ids).collect())
            .unwrap_or_default())
    }

    /// One XAUTOCLAIM step. A sweep that reaches the end of the pending list
    /// waits out another idle period before starting over.
    async fn claim(&mut self) -> QueueResult<Vec<StreamId>> {
        let mut conn = self.pool.get().await?;
        let reply: StreamAutoClaimReply = redis::cmd("XAUTOCLAIM")
            .arg(&self.topic)
            .arg(&self.group)
            .arg(&self.consumer)
            .arg(self.config.claim_idle_ms)
            .arg(&self.claim_cursor)
            .arg("COUNT")
            .arg(self.config.batch_size)
            .query_async(&mut conn)
            .await?;

        if reply.next_stream_id == START_ID {
            self.claim_cursor = START_ID.to_string();
            self.next_claim = Instant::now() + self.config.claim_idle();
        } else {
            self.claim_cursor = reply.next_stream_id;
        }
        if !reply.claimed.is_empty() {
            info!(
                topic = %self.topic,
                consumer = %self.consumer,
                count = reply.claimed.len(),
                "took over idle pending entries"
            );
        }
        Ok(reply.claimed)
    }

    async fn discard(&mut self, id: &str) -> QueueResult<()> {
        let mut conn = self.pool.get().await?;
        let _: u64 = redis::cmd("XACK")
            .arg(&self.topic)
            .arg(&self.group)
            .arg(id)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn fill(&mut self) -> QueueResult<()> {
        if self.pending_cursor.is_none() && Instant::now() >= self.next_claim {
            let claimed = self.claim().await?;
            if !claimed.is_empty() {
                return self.buffer(claimed).await;
            }
        }

        let entries = self.read().await?;

        if self.pending_cursor.is_some() {
            match entries.last() {
                Some(last) => {
                    debug!(topic = %self.topic, count = entries.len(), "replaying pending entries");
                    self.pending_cursor = Some(last.id.clone());
                }
                None => self.pending_cursor = None,
            }
        }
        self.buffer(entries).await
    }

    async fn buffer(&mut self, entries: Vec<StreamId>) -> QueueResult<()> {
        for entry in entries {
            let key: Option<String> = entry.get(KEY_FIELD);
            let payload: Option<Vec<u8>> = entry.get(PAYLOAD_FIELD);
            match (key, payload) {
                (Some(key), Some(payload)) => {
                    self.buffered.push_back(Delivery {
                        id: entry.id,
                        key,
                        payload: Bytes::from(payload),
                    })
                }
                _ => {
                    // Entries trimmed from the stream come back without fields.
                    warn!(topic = %self.topic, id = %entry.id, "dropping malformed stream entry");
                    self.discard(&entry.id).await?;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Subscription for RedisStreamSubscription {
    async fn next(&mut self) -> QueueResult<Option<Delivery>> {
        if self.buffered.is_empty() {
            self.fill().await?;
        }
        Ok(self.buffered.pop_front())
    }

    async fn ack(&mut self, delivery: &Delivery) -> QueueResult<()> {
        self.discard(&delivery.id).await
    }
}
