use std::sync::Arc;

use redis_connection::{CacheStore, CacheTypeBind};
use tracing::{debug, instrument};
use user_cache_keys::{UserGetCacheKey, UserListCacheKey, WriteEpoch};
use user_commands::{
    AddUsersCommand, CreateUserCommand, DeleteUserCommand, UpdateUserCommand,
};
use user_core::UserCore;
use user_errors::UserError;
use user_models::{NewUser, User};
use user_responses::{AddedUsersResponse, CreatedUserResponse};
use user_validation::{
    ValidUser, validate_add_users, validate_create, validate_delete,
    validate_update,
};

/// Argon2 is CPU bound, so it runs on the blocking pool.
async fn hash(password: String) -> Result<String, UserError> {
    tokio::task::spawn_blocking(move || credentials::hash_password(&password))
        .await
        .map_err(|e| UserError::internal(format!("hashing task failed: {e}")))?
        .map_err(UserError::from)
}

async fn verify(password: String, hash: String) -> Result<(), UserError> {
    tokio::task::spawn_blocking(move || {
        credentials::verify_password(&password, &hash)
    })
    .await
    .map_err(|e| UserError::internal(format!("verify task failed: {e}")))?
    .map_err(UserError::from)
}

async fn new_user(valid: ValidUser) -> Result<NewUser, UserError> {
    Ok(NewUser {
        password_hash: hash(valid.password).await?,
        email: valid.email,
        name: valid.name,
        role: valid.role,
    })
}

/// Write-side cache coherence: the entity key goes exactly, every list key
/// goes by prefix. The write epoch advances first so that a read already
/// in flight does not keep what it populates afterwards.
#[derive(Clone)]
struct Invalidator {
    cache: Arc<dyn CacheStore>,
}

impl Invalidator {
    async fn user(&self, user_id: i64) -> Result<(), UserError> {
        WriteEpoch::advance(self.cache.as_ref()).await?;
        UserGetCacheKey
            .bind_with(self.cache.as_ref(), &user_id)
            .remove()
            .await?;
        self.drop_lists().await
    }

    async fn lists(&self) -> Result<(), UserError> {
        WriteEpoch::advance(self.cache.as_ref()).await?;
        self.drop_lists().await
    }

    async fn drop_lists(&self) -> Result<(), UserError> {
        let removed = self
            .cache
            .invalidate_prefix(UserListCacheKey::PREFIX)
            .await?;
        debug!(removed, "list cache invalidated");
        Ok(())
    }
}

#[derive(Clone)]
pub struct CreateUserHandler {
    core: UserCore,
    invalidator: Invalidator,
}

impl CreateUserHandler {
    pub fn new(core: UserCore, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            core,
            invalidator: Invalidator { cache },
        }
    }

    #[instrument(skip_all, fields(email = %command.email))]
    pub async fn execute(
        &self, command: CreateUserCommand,
    ) -> Result<CreatedUserResponse, UserError> {
        let valid = validate_create(&command)?;
        let id = self.core.create(new_user(valid).await?).await?;
        self.invalidator.lists().await?;

        Ok(CreatedUserResponse { id })
    }
}

#[derive(Clone)]
pub struct UpdateUserHandler {
    core: UserCore,
    invalidator: Invalidator,
}

impl UpdateUserHandler {
    pub fn new(core: UserCore, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            core,
            invalidator: Invalidator { cache },
        }
    }

    #[instrument(skip_all, fields(user_id = command.user_id))]
    pub async fn execute(
        &self, command: UpdateUserCommand,
    ) -> Result<(), UserError> {
        let valid = validate_update(&command)?;
        let existing = self.core.get(command.user_id).await?;
        verify(command.old_password, existing.password_hash).await?;

        let user = new_user(valid).await?.with_id(command.user_id);
        self.core.update(user).await?;
        self.invalidator.user(command.user_id).await
    }
}

#[derive(Clone)]
pub struct DeleteUserHandler {
    core: UserCore,
    invalidator: Invalidator,
}

impl DeleteUserHandler {
    pub fn new(core: UserCore, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            core,
            invalidator: Invalidator { cache },
        }
    }

    #[instrument(skip_all, fields(user_id = command.user_id))]
    pub async fn execute(
        &self, command: DeleteUserCommand,
    ) -> Result<(), UserError> {
        validate_delete(&command)?;
        let User { password_hash, .. } = self.core.get(command.user_id).await?;
        verify(command.password, password_hash).await?;

        self.core.delete(command.user_id).await?;
        self.invalidator.user(command.user_id).await
    }
}

#[derive(Clone)]
pub struct AddUsersHandler {
    core: UserCore,
    invalidator: Invalidator,
}

impl AddUsersHandler {
    pub fn new(core: UserCore, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            core,
            invalidator: Invalidator { cache },
        }
    }

    /// Creates users in input order. A failure stops the batch; users
    /// created before it are kept.
    #[instrument(skip_all, fields(count = command.users.len()))]
    pub async fn execute(
        &self, command: AddUsersCommand,
    ) -> Result<AddedUsersResponse, UserError> {
        let valid = validate_add_users(&command)?;

        let mut ids = Vec::with_capacity(valid.len());
        let mut outcome = Ok(());
        for user in valid {
            match self.create_one(user).await {
                Ok(id) => ids.push(id),
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }

        if !ids.is_empty() {
            self.invalidator.lists().await?;
        }
        outcome.map(|()| AddedUsersResponse { ids })
    }

    async fn create_one(&self, user: ValidUser) -> Result<i64, UserError> {
        self.core.create(new_user(user).await?).await
    }
}
