use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use flume::{Receiver, Sender};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::{
    Delivery, MessageQueue, QueueConfig, QueueError, QueueResult, Subscription,
};

/// Shared channel of one consumer group. Every member receives from the
/// same flume receiver, so each message lands on exactly one of them.
#[derive(Clone)]
struct GroupChannel {
    tx: Sender<Delivery>,
    rx: Receiver<Delivery>,
}

#[derive(Default)]
struct Topic {
    groups: HashMap<String, GroupChannel>,
    next_seq: u64,
}

/// In-process broker with consumer-group semantics.
#[derive(Clone, Default)]
pub struct MemoryQueue {
    topics: Arc<Mutex<HashMap<String, Topic>>>,
    config: QueueConfig,
}

impl MemoryQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            topics: Arc::default(),
            config,
        }
    }

    /// Names of the groups currently attached to `topic`, sorted.
    pub async fn groups(&self, topic: &str) -> Vec<String> {
        let topics = self.topics.lock().await;
        let mut names: Vec<String> = topics
            .get(topic)
            .map(|t| t.groups.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    #[instrument(skip(self, payload))]
    async fn publish(
        &self, topic: &str, key: &str, payload: Bytes,
    ) -> QueueResult<String> {
        let mut topics = self.topics.lock().await;
        let topic = topics.entry(topic.to_string()).or_default();
        topic.next_seq += 1;

        let delivery = Delivery {
            id: format!("{}-0", topic.next_seq),
            key: key.to_string(),
            payload,
        };
        for (group, channel) in &topic.groups {
            channel
                .tx
                .send(delivery.clone())
                .map_err(|_| QueueError::Closed(group.clone()))?;
        }

        Ok(delivery.id)
    }

    #[instrument(skip(self))]
    async fn subscribe(
        &self, topic: &str, group: &str, consumer: &str,
    ) -> QueueResult<Box<dyn Subscription>> {
        let mut topics = self.topics.lock().await;
        let channel = topics
            .entry(topic.to_string())
            .or_default()
            .groups
            .entry(group.to_string())
            .or_insert_with(|| {
                let (tx, rx) = flume::unbounded();
                GroupChannel { tx, rx }
            })
            .clone();

        debug!(topic, group, consumer, "joined consumer group");
        Ok(Box::new(MemorySubscription {
            channel,
            pending: HashMap::new(),
            config: self.config.clone(),
        }))
    }

    #[instrument(skip(self))]
    async fn remove_group(&self, topic: &str, group: &str) -> QueueResult<()> {
        let mut topics = self.topics.lock().await;
        if let Some(topic) = topics.get_mut(topic) {
            if topic.groups.remove(group).is_some() {
                debug!(group, "removed consumer group");
            }
        }
        Ok(())
    }
}

pub struct MemorySubscription {
    channel: GroupChannel,
    pending: HashMap<String, Delivery>,
    config: QueueConfig,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next(&mut self) -> QueueResult<Option<Delivery>> {
        let received = tokio::time::timeout(
            self.config.poll_interval(),
            self.channel.rx.recv_async(),
        )
        .await;

        match received {
            Ok(Ok(delivery)) => {
                self.pending.insert(delivery.id.clone(), delivery.clone());
                Ok(Some(delivery))
            }
            Ok(Err(_)) => Err(QueueError::Closed("group channel".to_string())),
            Err(_) => Ok(None),
        }
    }

    async fn ack(&mut self, delivery: &Delivery) -> QueueResult<()> {
        self.pending.remove(&delivery.id);
        Ok(())
    }
}

impl Drop for MemorySubscription {
    /// Unacked work goes back to the group for another member.
    fn drop(&mut self) {
        for (_, delivery) in self.pending.drain() {
            let _ = self.channel.tx.send(delivery);
        }
    }
}
