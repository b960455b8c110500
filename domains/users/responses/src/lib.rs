use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CreatedUserResponse {
    pub id: i64,
}

/// Ids of a batch insert, in the order the users were submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AddedUsersResponse {
    pub ids: Vec<i64>,
}
