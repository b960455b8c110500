use serde::{Deserialize, Serialize};
use user_models::{PageRequest, SortingOrder};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListUsersQuery {
    pub page: PageRequest,
    pub order: SortingOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetUserQuery {
    pub user_id: i64,
}
