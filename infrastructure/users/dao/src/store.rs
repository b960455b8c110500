use async_trait::async_trait;
use user_errors::UserError;
use user_models::{NewUser, PageRequest, SortingOrder, User};

/// Durable persistence for user records.
///
/// Implementations enforce email uniqueness themselves; callers never take a
/// lock above this trait.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `AlreadyExists` when the email is taken.
    async fn create(&self, user: NewUser) -> Result<i64, UserError>;

    async fn get(&self, id: i64) -> Result<User, UserError>;

    /// Replaces every mutable field of `user.id`. Fails with `NotFound` for
    /// an unknown id and `AlreadyExists` when the email belongs to another
    /// user.
    async fn update(&self, user: User) -> Result<(), UserError>;

    async fn delete(&self, id: i64) -> Result<(), UserError>;

    async fn list(
        &self, page: PageRequest, order: SortingOrder,
    ) -> Result<Vec<User>, UserError>;
}
