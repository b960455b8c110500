use std::time::Duration;

use async_trait::async_trait;
use message_queue::{Delivery, Subscription};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use user_errors::UserError;

/// Processing step of one relay role.
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    /// `Ok` means the delivery is done with and may be acked.
    async fn handle(&self, delivery: &Delivery) -> Result<(), UserError>;
}

/// Drives a subscription until `cancel` fires. A delivery is acked only after
/// its handler succeeded; a failed one stays pending for redelivery.
pub async fn run_worker(
    role: &'static str, mut subscription: Box<dyn Subscription>,
    handler: &dyn DeliveryHandler, cancel: CancellationToken, backoff: Duration,
) {
    info!(role, "relay worker started");

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = subscription.next() => next,
        };

        match next {
            Ok(Some(delivery)) => {
                debug!(role, key = %delivery.key, id = %delivery.id, "delivery received");
                match handler.handle(&delivery).await {
                    Ok(()) => {
                        if let Err(e) = subscription.ack(&delivery).await {
                            error!(role, id = %delivery.id, error = %e, "ack failed");
                        }
                    }
                    Err(e) => {
                        error!(role, key = %delivery.key, error = %e, "processing failed, left pending");
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                error!(role, error = %e, "queue read failed");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
        }
    }

    info!(role, "relay worker stopped");
}
