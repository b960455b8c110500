use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateUserCommand {
    pub email: String,
    pub name: String,
    /// `Admin` or `User`
    pub role: String,
    pub password: String,
}

/// Full replace of the mutable fields. `old_password` must match the
/// stored hash.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateUserCommand {
    #[serde(skip)]
    pub user_id: i64,
    pub email: String,
    pub name: String,
    pub role: String,
    pub password: String,
    pub old_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeleteUserCommand {
    #[serde(skip)]
    pub user_id: i64,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct AddUsersCommand {
    pub users: Vec<CreateUserCommand>,
}
