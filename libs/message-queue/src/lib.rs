use async_trait::async_trait;
use bytes::Bytes;

pub mod config;
pub mod memory;
pub mod redis_stream;

pub use config::QueueConfig;
pub use memory::MemoryQueue;
pub use redis_stream::RedisStreamQueue;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    #[error("Queue closed: {0}")]
    Closed(String),
}

pub type QueueResult<T> = Result<T, QueueError>;

/// One message handed to a consumer. It stays pending in its group until
/// acked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: String,
    pub key: String,
    pub payload: Bytes,
}

/// Keyed, topic-based queue with consumer groups.
///
/// Inside a group each message goes to exactly one member. Separate groups
/// on the same topic each see every message published after they were
/// created.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Returns the id the queue assigned to the message.
    async fn publish(
        &self, topic: &str, key: &str, payload: Bytes,
    ) -> QueueResult<String>;

    /// Joins `group` on `topic` as `consumer`, creating the group if needed.
    async fn subscribe(
        &self, topic: &str, group: &str, consumer: &str,
    ) -> QueueResult<Box<dyn Subscription>>;

    /// Deletes `group` and whatever it still has pending. Members that are
    /// still subscribed stop receiving new messages.
    async fn remove_group(&self, topic: &str, group: &str) -> QueueResult<()>;
}

#[async_trait]
pub trait Subscription: Send {
    /// Waits up to the poll interval. `None` means nothing arrived.
    async fn next(&mut self) -> QueueResult<Option<Delivery>>;

    async fn ack(&mut self, delivery: &Delivery) -> QueueResult<()>;
}
