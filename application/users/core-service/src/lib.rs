use std::{future::Future, sync::Arc};

use app_metrics::ServiceCounters;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use user_dao::UserStore;
use user_errors::UserError;
use user_models::{NewUser, PageRequest, SortingOrder, User};

pub mod config;

pub use config::CoreConfig;

/// Deadline-bounded access to the user store.
///
/// Every call races the store future against the configured timeout and the
/// shutdown token. The losing store future is dropped where it stands, which
/// releases any pooled connection it was holding.
#[derive(Clone)]
pub struct UserCore {
    store: Arc<dyn UserStore>,
    config: CoreConfig,
    cancel: CancellationToken,
    counters: Arc<ServiceCounters>,
}

impl UserCore {
    pub fn new(
        store: Arc<dyn UserStore>, config: CoreConfig, cancel: CancellationToken,
        counters: Arc<ServiceCounters>,
    ) -> Self {
        Self {
            store,
            config,
            cancel,
            counters,
        }
    }

    pub fn config(&self) -> &CoreConfig { &self.config }

    pub fn counters(&self) -> &Arc<ServiceCounters> { &self.counters }

    async fn bounded<T, F>(
        &self, operation: &'static str, call: F,
    ) -> Result<T, UserError>
    where
        F: Future<Output = Result<T, UserError>>,
    {
        ServiceCounters::incr(&self.counters.requests_out);

        tokio::select! {
            _ = self.cancel.cancelled() => {
                debug!(operation, "store call cancelled");
                Err(UserError::internal("operation cancelled"))
            }
            outcome = tokio::time::timeout(self.config.timeout, call) => {
                match outcome {
                    Ok(result) => {
                        debug!(operation, ok = result.is_ok(), "store call completed");
                        result
                    }
                    Err(_) => {
                        warn!(
                            operation,
                            timeout_ms = self.config.timeout.as_millis() as u64,
                            "store call timed out"
                        );
                        Err(UserError::DeadlineExceeded { operation })
                    }
                }
            }
        }
    }

    #[instrument(skip(self, user))]
    pub async fn create(&self, user: NewUser) -> Result<i64, UserError> {
        self.bounded("create", self.store.create(user)).await
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: i64) -> Result<User, UserError> {
        self.bounded("get", self.store.get(id)).await
    }

    #[instrument(skip(self, user), fields(user_id = user.id))]
    pub async fn update(&self, user: User) -> Result<(), UserError> {
        self.bounded("update", self.store.update(user)).await
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<(), UserError> {
        self.bounded("delete", self.store.delete(id)).await
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self, page: PageRequest, order: SortingOrder,
    ) -> Result<Vec<User>, UserError> {
        self.bounded("list", self.store.list(page, order)).await
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicBool, Ordering},
        time::Duration,
    };

    use async_trait::async_trait;
    use user_dao::MemoryUserStore;
    use user_models::Role;

    use super::*;

    struct DropGuard(Arc<AtomicBool>);

    impl Drop for DropGuard {
        fn drop(&mut self) { self.0.store(true, Ordering::SeqCst); }
    }

    /// Store whose reads never finish before `delay`.
    struct SlowStore {
        delay: Duration,
        dropped: Arc<AtomicBool>,
    }

    #[async_trait]
    impl UserStore for SlowStore {
        async fn create(&self, _user: NewUser) -> Result<i64, UserError> {
            Ok(1)
        }

        async fn get(&self, id: i64) -> Result<User, UserError> {
            let _guard = DropGuard(self.dropped.clone());
            tokio::time::sleep(self.delay).await;
            Err(UserError::NotFound { user_id: id })
        }

        async fn update(&self, _user: User) -> Result<(), UserError> { Ok(()) }

        async fn delete(&self, _id: i64) -> Result<(), UserError> { Ok(()) }

        async fn list(
            &self, _page: PageRequest, _order: SortingOrder,
        ) -> Result<Vec<User>, UserError> {
            tokio::time::sleep(self.delay).await;
            Ok(Vec::new())
        }
    }

    fn core_with(store: Arc<dyn UserStore>, timeout: Duration) -> UserCore {
        UserCore::new(
            store,
            CoreConfig::builder().timeout(timeout).build(),
            CancellationToken::new(),
            Arc::new(ServiceCounters::new()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_store_hits_deadline_and_is_dropped() {
        let dropped = Arc::new(AtomicBool::new(false));
        let store = Arc::new(SlowStore {
            delay: Duration::from_secs(10),
            dropped: dropped.clone(),
        });
        let core = core_with(store, Duration::from_millis(100));

        let result = core.get(1).await;
        assert!(matches!(
            result,
            Err(UserError::DeadlineExceeded { operation: "get" })
        ));
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_store_completes_within_deadline() {
        let store = Arc::new(SlowStore {
            delay: Duration::from_millis(10),
            dropped: Arc::new(AtomicBool::new(false)),
        });
        let core = core_with(store, Duration::from_millis(100));

        assert!(core.list(PageRequest::default(), SortingOrder::default()).await.unwrap().is_empty());
        assert!(matches!(
            core.get(3).await,
            Err(UserError::NotFound { user_id: 3 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_in_flight_call() {
        let dropped = Arc::new(AtomicBool::new(false));
        let store = Arc::new(SlowStore {
            delay: Duration::from_secs(10),
            dropped: dropped.clone(),
        });
        let cancel = CancellationToken::new();
        let core = UserCore::new(
            store,
            CoreConfig::builder().timeout(Duration::from_secs(60)).build(),
            cancel.clone(),
            Arc::new(ServiceCounters::new()),
        );

        let call = tokio::spawn(async move { core.get(1).await });
        tokio::time::sleep(Duration::from_millis(5)).await;
        cancel.cancel();

        match call.await.unwrap() {
            Err(UserError::Internal(msg)) => {
                assert_eq!(msg, "operation cancelled")
            }
            other => panic!("Expected cancellation, got {other:?}"),
        }
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_operations_pass_through_to_store() -> anyhow::Result<()> {
        let counters = Arc::new(ServiceCounters::new());
        let core = UserCore::new(
            Arc::new(MemoryUserStore::default()),
            CoreConfig::default(),
            CancellationToken::new(),
            counters.clone(),
        );

        let id = core
            .create(NewUser {
                email: "a@b.com".into(),
                name: "Ann".into(),
                role: Role::Admin,
                password_hash: "hash".into(),
            })
            .await?;
        let mut user = core.get(id).await?;
        user.name = "Anna".into();
        core.update(user).await?;
        assert_eq!(core.get(id).await?.name, "Anna");

        core.delete(id).await?;
        assert!(matches!(core.get(id).await, Err(UserError::NotFound { .. })));
        assert_eq!(counters.snapshot().requests_out, 6);
        Ok(())
    }
}
