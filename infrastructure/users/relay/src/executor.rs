use std::{sync::Arc, time::Duration};

use app_metrics::ServiceCounters;
use async_trait::async_trait;
use message_queue::{Delivery, MessageQueue};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use user_errors::UserError;
use user_query_handlers::{GetUserQueryHandler, ListUsersQueryHandler};

use crate::{
    config::{BACKEND_REQUEST_GROUP, RelayTopics},
    envelope::{Envelope, RelayCommand},
    worker::{DeliveryHandler, run_worker},
};

/// Backend side of the relay. Answers forwarded requests through the same
/// query handlers the HTTP API uses.
pub struct Executor {
    queue: Arc<dyn MessageQueue>,
    topics: RelayTopics,
    get_user: GetUserQueryHandler,
    list_users: ListUsersQueryHandler,
    counters: Arc<ServiceCounters>,
}

impl Executor {
    pub fn new(
        queue: Arc<dyn MessageQueue>, topics: RelayTopics,
        get_user: GetUserQueryHandler, list_users: ListUsersQueryHandler,
        counters: Arc<ServiceCounters>,
    ) -> Self {
        Self {
            queue,
            topics,
            get_user,
            list_users,
            counters,
        }
    }

    /// Joins the consumer group, then processes deliveries on a new task
    /// until `cancel` fires.
    pub async fn spawn(
        self, consumer: &str, cancel: CancellationToken, backoff: Duration,
    ) -> Result<JoinHandle<()>, UserError> {
        let subscription = self
            .queue
            .subscribe(&self.topics.backend_request, BACKEND_REQUEST_GROUP, consumer)
            .await?;

        Ok(tokio::spawn(async move {
            run_worker("executor", subscription, &self, cancel, backoff).await;
        }))
    }

    async fn execute(&self, envelope: &Envelope) -> Result<Envelope, UserError> {
        match RelayCommand::from_envelope(envelope)? {
            RelayCommand::UserList(request) => {
                let query = request.normalized().to_query()?;
                let users = self.list_users.execute(query).await?;
                Envelope::success(&envelope.command, &users)
            }
            RelayCommand::UserGet(request) => {
                let user = self.get_user.execute(request.into()).await?;
                Envelope::success(&envelope.command, &user)
            }
        }
    }
}

#[async_trait]
impl DeliveryHandler for Executor {
    #[instrument(skip_all, fields(key = %delivery.key))]
    async fn handle(&self, delivery: &Delivery) -> Result<(), UserError> {
        ServiceCounters::incr(&self.counters.requests_in);

        let result = match Envelope::decode(&delivery.payload) {
            Ok(envelope) => {
                self.execute(&envelope)
                    .await
                    .map_err(|e| (envelope.command, e))
            }
            Err(e) => Err((String::new(), e)),
        };
        self.counters.record(&result);

        let reply = match result {
            Ok(reply) => reply,
            Err((command, e)) => {
                debug!(command = %command, error = %e, "command failed");
                Envelope::failure(command, &e)
            }
        };

        self.queue
            .publish(&self.topics.response, &delivery.key, reply.encode()?)
            .await?;
        ServiceCounters::incr(&self.counters.relay_executed);
        Ok(())
    }
}
