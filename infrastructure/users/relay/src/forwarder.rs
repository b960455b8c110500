use std::{sync::Arc, time::Duration};

use app_metrics::ServiceCounters;
use async_trait::async_trait;
use message_queue::{Delivery, MessageQueue};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use user_errors::UserError;

use crate::{
    config::{CLIENT_REQUEST_GROUP, RelayTopics},
    envelope::{Envelope, RelayCommand},
    worker::{DeliveryHandler, run_worker},
};

/// Validates what a client sent before it costs the backend anything.
///
/// List requests get their defaults filled in. A request that fails
/// validation is answered straight onto the response topic.
pub fn normalize(envelope: &Envelope) -> Result<RelayCommand, UserError> {
    match RelayCommand::from_envelope(envelope)? {
        RelayCommand::UserList(request) => {
            let request = request.normalized();
            request.to_query()?;
            Ok(RelayCommand::UserList(request))
        }
        get @ RelayCommand::UserGet(_) => Ok(get),
    }
}

pub struct Forwarder {
    queue: Arc<dyn MessageQueue>,
    topics: RelayTopics,
    counters: Arc<ServiceCounters>,
}

impl Forwarder {
    pub fn new(
        queue: Arc<dyn MessageQueue>, topics: RelayTopics,
        counters: Arc<ServiceCounters>,
    ) -> Self {
        Self {
            queue,
            topics,
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
            .subscribe(&self.topics.client_request, CLIENT_REQUEST_GROUP, consumer)
            .await?;

        Ok(tokio::spawn(async move {
            run_worker("forwarder", subscription, &self, cancel, backoff).await;
        }))
    }

    fn reject(&self, command: String, err: UserError) -> Envelope {
        debug!(command = %command, error = %err, "request rejected");
        ServiceCounters::incr(&self.counters.errors);
        Envelope::failure(command, &err)
    }
}

#[async_trait]
impl DeliveryHandler for Forwarder {
    #[instrument(skip_all, fields(key = %delivery.key))]
    async fn handle(&self, delivery: &Delivery) -> Result<(), UserError> {
        ServiceCounters::incr(&self.counters.requests_in);

        let (envelope, forwarded) = match Envelope::decode(&delivery.payload) {
            Err(e) => (self.reject(String::new(), e), false),
            Ok(envelope) => {
                match normalize(&envelope) {
                    Ok(command) => (command.to_envelope()?, true),
                    Err(e) => (self.reject(envelope.command, e), false),
                }
            }
        };
        let topic = if forwarded {
            &self.topics.backend_request
        }
        else {
            &self.topics.response
        };

        self.queue
            .publish(topic, &delivery.key, envelope.encode()?)
            .await?;
        if forwarded {
            ServiceCounters::incr(&self.counters.relay_forwarded);
            debug!(topic = %topic, "request forwarded");
        }
        Ok(())
    }
}
