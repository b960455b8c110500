use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::{RwLock, Semaphore, SemaphorePermit};
use tracing::instrument;
use user_errors::UserError;
use user_models::{NewUser, PageRequest, SortField, SortingOrder, User};

use crate::store::UserStore;

pub const DEFAULT_POOL_SIZE: usize = 10;

#[derive(Debug)]
struct Inner {
    users: BTreeMap<i64, User>,
    next_id: i64,
}

/// In-process store. All operations go through one reader/writer lock and
/// a fixed-size admission gate bounds how many calls are in flight.
#[derive(Debug)]
pub struct MemoryUserStore {
    inner: RwLock<Inner>,
    gate: Semaphore,
}

impl MemoryUserStore {
    pub fn new(pool_size: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                users: BTreeMap::new(),
                next_id: 1,
            }),
            gate: Semaphore::new(pool_size.max(1)),
        }
    }

    async fn admit(&self) -> Result<SemaphorePermit<'_>, UserError> {
        self.gate
            .acquire()
            .await
            .map_err(|_| UserError::internal("store admission gate closed"))
    }

    pub async fn len(&self) -> usize { self.inner.read().await.users.len() }

    pub async fn is_empty(&self) -> bool { self.len().await == 0 }
}

impl Default for MemoryUserStore {
    fn default() -> Self { Self::new(DEFAULT_POOL_SIZE) }
}

fn compare(a: &User, b: &User, field: SortField) -> std::cmp::Ordering {
    let primary = match field {
        SortField::Id => a.id.cmp(&b.id),
        SortField::Name => a.name.cmp(&b.name),
        SortField::Email => a.email.cmp(&b.email),
    };
    primary.then(a.id.cmp(&b.id))
}

#[async_trait]
impl UserStore for MemoryUserStore {
    #[instrument(skip(self, user))]
    async fn create(&self, user: NewUser) -> Result<i64, UserError> {
        let _permit = self.admit().await?;
        let mut inner = self.inner.write().await;

        if inner.users.values().any(|u| u.email == user.email) {
            return Err(UserError::AlreadyExists { email: user.email });
        }

        let id = inner.next_id;
        inner.next_id += 1;
        inner.users.insert(id, user.with_id(id));
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn get(&self, id: i64) -> Result<User, UserError> {
        let _permit = self.admit().await?;
        let inner = self.inner.read().await;

        inner
            .users
            .get(&id)
            .cloned()
            .ok_or(UserError::NotFound { user_id: id })
    }

    #[instrument(skip(self, user), fields(user_id = user.id))]
    async fn update(&self, user: User) -> Result<(), UserError> {
        let _permit = self.admit().await?;
        let mut inner = self.inner.write().await;

        if !inner.users.contains_key(&user.id) {
            return Err(UserError::NotFound { user_id: user.id });
        }
        if inner
            .users
            .values()
            .any(|u| u.email == user.email && u.id != user.id)
        {
            return Err(UserError::AlreadyExists { email: user.email });
        }

        inner.users.insert(user.id, user);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i64) -> Result<(), UserError> {
        let _permit = self.admit().await?;
        let mut inner = self.inner.write().await;

        inner
            .users
            .remove(&id)
            .map(|_| ())
            .ok_or(UserError::NotFound { user_id: id })
    }

    #[instrument(skip(self))]
    async fn list(
        &self, page: PageRequest, order: SortingOrder,
    ) -> Result<Vec<User>, UserError> {
        let _permit = self.admit().await?;
        let inner = self.inner.read().await;

        let mut users: Vec<&User> = inner.users.values().collect();
        users.sort_by(|a, b| compare(a, b, order.field));
        if order.descending {
            users.reverse();
        }

        Ok(users
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.page_size as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use user_models::Role;

    use super::*;

    fn new_user(email: &str, name: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            name: name.to_string(),
            role: Role::User,
            password_hash: "hash".to_string(),
        }
    }

    #[tokio::test]
    async fn test_ids_are_sequential_from_one() {
        let store = MemoryUserStore::default();
        assert_eq!(store.create(new_user("a@b.com", "A")).await.unwrap(), 1);
        assert_eq!(store.create(new_user("c@d.com", "C")).await.unwrap(), 2);

        store.delete(2).await.unwrap();
        assert_eq!(store.create(new_user("e@f.com", "E")).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected_without_mutation() {
        let store = MemoryUserStore::default();
        store.create(new_user("a@b.com", "A")).await.unwrap();

        let result = store.create(new_user("a@b.com", "Other")).await;
        assert!(matches!(result, Err(UserError::AlreadyExists { .. })));
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get(1).await.unwrap().name, "A");
    }

    #[tokio::test]
    async fn test_update_rules() {
        let store = MemoryUserStore::default();
        store.create(new_user("a@b.com", "A")).await.unwrap();
        store.create(new_user("c@d.com", "C")).await.unwrap();

        let mut user = store.get(1).await.unwrap();
        user.email = "c@d.com".into();
        assert!(matches!(
            store.update(user.clone()).await,
            Err(UserError::AlreadyExists { .. })
        ));

        user.email = "a@b.com".into();
        user.name = "A2".into();
        store.update(user).await.unwrap();
        assert_eq!(store.get(1).await.unwrap().name, "A2");
        assert_eq!(store.get(2).await.unwrap().name, "C");

        let ghost = new_user("x@y.com", "X").with_id(99);
        assert!(matches!(
            store.update(ghost).await,
            Err(UserError::NotFound { user_id: 99 })
        ));
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let store = MemoryUserStore::default();
        assert!(matches!(
            store.delete(5).await,
            Err(UserError::NotFound { user_id: 5 })
        ));
    }

    #[tokio::test]
    async fn test_list_sorting_and_pagination() {
        let store = MemoryUserStore::default();
        for (email, name) in [
            ("c@x.com", "Carol"),
            ("a@x.com", "Bob"),
            ("b@x.com", "Alice"),
        ] {
            store.create(new_user(email, name)).await.unwrap();
        }

        let by_name = store
            .list(
                PageRequest::new(Some(2), Some(1)),
                SortingOrder {
                    field: SortField::Name,
                    descending: false,
                },
            )
            .await
            .unwrap();
        let names: Vec<_> = by_name.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, ["Alice", "Bob"]);

        let second_page = store
            .list(
                PageRequest::new(Some(2), Some(2)),
                SortingOrder {
                    field: SortField::Name,
                    descending: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(second_page.len(), 1);
        assert_eq!(second_page[0].name, "Carol");

        let by_email_desc = store
            .list(
                PageRequest::default(),
                SortingOrder {
                    field: SortField::Email,
                    descending: true,
                },
            )
            .await
            .unwrap();
        let emails: Vec<_> =
            by_email_desc.iter().map(|u| u.email.as_str()).collect();
        assert_eq!(emails, ["c@x.com", "b@x.com", "a@x.com"]);

        let ids: Vec<_> = store
            .list(PageRequest::default(), SortingOrder::default())
            .await
            .unwrap()
            .iter()
            .map(|u| u.id)
            .collect();
        assert_eq!(ids, [1, 2, 3]);
    }

    #[tokio::test]
    async fn test_page_beyond_end_is_empty() {
        let store = MemoryUserStore::default();
        store.create(new_user("a@b.com", "A")).await.unwrap();

        let page = PageRequest {
            page_size: 5,
            page_num: u64::MAX,
        };
        let users = store.list(page, SortingOrder::default()).await.unwrap();
        assert!(users.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_creates_keep_emails_unique() {
        let store = Arc::new(MemoryUserStore::new(3));
        let handles: Vec<_> = (0..20)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .create(new_user(&format!("u{}@x.com", i % 5), "N"))
                        .await
                })
            })
            .collect();

        let results = futures::future::join_all(handles).await;
        let created = results
            .into_iter()
            .filter(|r| matches!(r, Ok(Ok(_))))
            .count();
        assert_eq!(created, 5);
        assert_eq!(store.len().await, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_admits_at_most_pool_size_calls() -> anyhow::Result<()> {
        let store = Arc::new(MemoryUserStore::new(2));
        let id = store.create(new_user("a@x.com", "A")).await?;

        let first = store.admit().await?;
        assert!(
            tokio::time::timeout(Duration::from_millis(50), store.get(id))
                .await
                .is_ok(),
            "one free permit admits a call"
        );

        let second = store.admit().await?;
        assert_eq!(store.gate.available_permits(), 0);
        let waiting = {
            let store = store.clone();
            tokio::spawn(async move { store.get(id).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiting.is_finished(), "third call must wait for a permit");

        drop(first);
        let user = tokio::time::timeout(Duration::from_millis(50), waiting).await???;
        assert_eq!(user.email, "a@x.com");
        drop(second);
        assert_eq!(store.gate.available_permits(), 2);
        Ok(())
    }
}
