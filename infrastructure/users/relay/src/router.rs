use std::{collections::HashMap, sync::Arc};

use app_metrics::ServiceCounters;
use async_trait::async_trait;
use message_queue::{Delivery, MessageQueue};
use tokio::{
    sync::{Mutex, oneshot},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use user_errors::UserError;
use user_models::UserView;
use user_queries::{GetUserQuery, ListUsersQuery};
use uuid::Uuid;

use crate::{
    config::RelayConfig,
    envelope::{Envelope, RelayCommand, RelayReply, UserGetRequest},
    worker::{DeliveryHandler, run_worker},
};

/// Correlation key to the caller waiting for it.
#[derive(Default)]
pub struct ResponseRouter {
    pending: Mutex<HashMap<String, oneshot::Sender<RelayReply>>>,
    counters: Arc<ServiceCounters>,
}

impl ResponseRouter {
    pub fn new(counters: Arc<ServiceCounters>) -> Self {
        Self {
            pending: Mutex::default(),
            counters,
        }
    }

    pub async fn register(&self, key: &str) -> oneshot::Receiver<RelayReply> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(key.to_string(), tx);
        rx
    }

    pub async fn deregister(&self, key: &str) {
        self.pending.lock().await.remove(key);
    }

    pub async fn waiting(&self) -> usize { self.pending.lock().await.len() }

    /// Hands a reply to its waiter. Returns whether one was registered.
    pub async fn route(&self, key: &str, reply: RelayReply) -> bool {
        let waiter = self.pending.lock().await.remove(key);
        match waiter {
            Some(tx) => tx.send(reply).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl DeliveryHandler for ResponseRouter {
    async fn handle(&self, delivery: &Delivery) -> Result<(), UserError> {
        let reply = match Envelope::decode(&delivery.payload) {
            Ok(envelope) => RelayReply(envelope),
            Err(e) => {
                warn!(key = %delivery.key, error = %e, "undecodable reply dropped");
                return Ok(());
            }
        };

        if !self.route(&delivery.key, reply).await {
            ServiceCounters::incr(&self.counters.relay_unmatched);
            debug!(key = %delivery.key, "no waiter for reply");
        }
        Ok(())
    }
}

/// Caller side of the relay: publishes a request and waits for the reply
/// carrying the same correlation key.
#[derive(Clone)]
pub struct RelayClient {
    queue: Arc<dyn MessageQueue>,
    router: Arc<ResponseRouter>,
    config: RelayConfig,
    counters: Arc<ServiceCounters>,
}

impl RelayClient {
    /// Joins this process's response group and spawns the router on it.
    /// The subscription exists before this returns, so no reply to a later
    /// request can be missed.
    pub async fn start(
        queue: Arc<dyn MessageQueue>, config: RelayConfig,
        counters: Arc<ServiceCounters>, cancel: CancellationToken,
    ) -> Result<(Self, JoinHandle<()>), UserError> {
        let router = Arc::new(ResponseRouter::new(counters.clone()));
        let group = config.response_group();
        let subscription = queue
            .subscribe(&config.topics.response, &group, &config.instance_id)
            .await?;

        let worker = {
            let router = router.clone();
            let backoff = config.poll_interval;
            tokio::spawn(async move {
                run_worker("response-router", subscription, router.as_ref(), cancel, backoff)
                    .await;
            })
        };

        Ok((
            Self {
                queue,
                router,
                config,
                counters,
            },
            worker,
        ))
    }

    pub fn router(&self) -> &Arc<ResponseRouter> { &self.router }

    /// Drops this process's response group. Call once the router task has
    /// stopped; the group name is unique to this run and is never rejoined.
    pub async fn release(&self) -> Result<(), UserError> {
        self.queue
            .remove_group(&self.config.topics.response, &self.config.response_group())
            .await?;
        debug!(group = %self.config.response_group(), "response group released");
        Ok(())
    }

    #[instrument(skip_all, fields(command = command.name()))]
    pub async fn request(
        &self, command: RelayCommand,
    ) -> Result<RelayReply, UserError> {
        let key = Uuid::new_v4().simple().to_string();
        let payload = command.to_envelope()?.encode()?;

        let reply = self.router.register(&key).await;
        ServiceCounters::incr(&self.counters.requests_out);
        if let Err(e) = self
            .queue
            .publish(&self.config.topics.client_request, &key, payload)
            .await
        {
            self.router.deregister(&key).await;
            return Err(e.into());
        }
        debug!(key = %key, "request published");

        match tokio::time::timeout(self.config.request_timeout, reply).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(UserError::internal("response router stopped")),
            Err(_) => {
                self.router.deregister(&key).await;
                warn!(key = %key, "relay request timed out");
                Err(UserError::DeadlineExceeded {
                    operation: command.name(),
                })
            }
        }
    }

    pub async fn list_users(
        &self, query: ListUsersQuery,
    ) -> Result<Vec<UserView>, UserError> {
        self.request(RelayCommand::UserList(query.into()))
            .await?
            .into_result()
    }

    pub async fn get_user(
        &self, query: GetUserQuery,
    ) -> Result<UserView, UserError> {
        self.request(RelayCommand::UserGet(UserGetRequest {
            id: query.user_id,
        }))
        .await?
        .into_result()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use message_queue::{MemoryQueue, QueueConfig};
    use serde_json::json;

    use super::*;

    fn reply_for(command: &str, data: serde_json::Value) -> RelayReply {
        RelayReply(Envelope {
            command: command.into(),
            request_data: data,
        })
    }

    #[tokio::test]
    async fn test_replies_reach_only_their_waiter() {
        let router = ResponseRouter::new(Arc::new(ServiceCounters::new()));
        let k1 = router.register("K1").await;
        let k2 = router.register("K2").await;

        assert!(router.route("K2", reply_for("UserGet", json!({"id": 2}))).await);
        assert!(router.route("K1", reply_for("UserGet", json!({"id": 1}))).await);

        assert_eq!(k1.await.unwrap().0.request_data, json!({"id": 1}));
        assert_eq!(k2.await.unwrap().0.request_data, json!({"id": 2}));
        assert_eq!(router.waiting().await, 0);
    }

    #[tokio::test]
    async fn test_unmatched_reply_is_counted_and_harmless() -> anyhow::Result<()> {
        let counters = Arc::new(ServiceCounters::new());
        let router = ResponseRouter::new(counters.clone());
        let waiter = router.register("K1").await;

        let stray = Delivery {
            id: "1-0".into(),
            key: "other-process".into(),
            payload: Envelope::failure("UserList", &UserError::internal("late")).encode()?,
        };
        router.handle(&stray).await?;

        assert_eq!(counters.snapshot().relay_unmatched, 1);
        assert_eq!(router.waiting().await, 1);
        drop(waiter);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_times_out_and_deregisters() -> anyhow::Result<()> {
        let queue = Arc::new(MemoryQueue::new(QueueConfig {
            poll_interval_ms: 20,
            batch_size: 8,
            ..QueueConfig::default()
        }));
        let cancel = CancellationToken::new();
        let config = RelayConfig::builder()
            .request_timeout(Duration::from_millis(100))
            .poll_interval(Duration::from_millis(20))
            .build();
        let (client, worker) = RelayClient::start(
            queue,
            config,
            Arc::new(ServiceCounters::new()),
            cancel.clone(),
        )
        .await?;

        let result = client.get_user(GetUserQuery { user_id: 1 }).await;
        assert!(matches!(
            result,
            Err(UserError::DeadlineExceeded { operation: "UserGet" })
        ));
        assert_eq!(client.router().waiting().await, 0);

        cancel.cancel();
        worker.await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_release_drops_the_response_group() -> anyhow::Result<()> {
        let queue = Arc::new(MemoryQueue::new(QueueConfig {
            poll_interval_ms: 20,
            batch_size: 8,
            ..QueueConfig::default()
        }));
        let cancel = CancellationToken::new();
        let config = RelayConfig::builder().instance_id("once").build();
        let (client, worker) = RelayClient::start(
            queue.clone(),
            config,
            Arc::new(ServiceCounters::new()),
            cancel.clone(),
        )
        .await?;
        assert_eq!(queue.groups("ui_response").await, vec!["uiResponseConsuming-once"]);

        cancel.cancel();
        worker.await?;
        client.release().await?;
        assert!(queue.groups("ui_response").await.is_empty());
        Ok(())
    }
}
