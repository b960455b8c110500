use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const DEFAULT_PAGE_SIZE: u64 = 5;
pub const DEFAULT_PAGE_NUM: u64 = 1;
/// Largest offset or page size a store is asked for. Postgres takes
/// `LIMIT`/`OFFSET` as `bigint`.
pub const MAX_PAGE_BOUND: u64 = i64::MAX as u64;

/// Stored user record. Only the store and the core service ever see the
/// password hash; everything handed back to callers is a [`UserView`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub password_hash: String,
}

/// A user that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub role: Role,
    pub password_hash: String,
}

impl NewUser {
    pub fn with_id(self, id: i64) -> User {
        User {
            id,
            email: self.email,
            name: self.name,
            role: self.role,
            password_hash: self.password_hash,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserView {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub role: Role,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("bad role {0}")]
    Role(String),
    #[error("bad sorting field {0}")]
    SortField(String),
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema,
)]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Admin, Role::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::User => "User",
        }
    }

    /// Identifier of the role row in the `roles` table.
    pub fn id(&self) -> i32 {
        match self {
            Role::Admin => 1,
            Role::User => 2,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| ParseError::Role(s.to_string()))
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    #[default]
    Id,
    Name,
    Email,
}

impl SortField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::Id => "id",
            SortField::Name => "name",
            SortField::Email => "email",
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortField {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "id" => Ok(SortField::Id),
            "name" => Ok(SortField::Name),
            "email" => Ok(SortField::Email),
            other => Err(ParseError::SortField(other.to_string())),
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
)]
pub struct SortingOrder {
    pub field: SortField,
    pub descending: bool,
}

/// 1-based page selector. Zero values fall back to the defaults so the
/// offset computation can never underflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRequest {
    pub page_size: u64,
    pub page_num: u64,
}

impl PageRequest {
    pub fn new(page_size: Option<u64>, page_num: Option<u64>) -> Self {
        Self {
            page_size: page_size
                .filter(|v| *v > 0)
                .unwrap_or(DEFAULT_PAGE_SIZE),
            page_num: page_num.filter(|v| *v > 0).unwrap_or(DEFAULT_PAGE_NUM),
        }
    }

    /// `None` when the page lies beyond [`MAX_PAGE_BOUND`].
    pub fn checked_offset(&self) -> Option<u64> {
        if self.page_size > MAX_PAGE_BOUND {
            return None;
        }
        self.page_num
            .saturating_sub(1)
            .checked_mul(self.page_size)
            .filter(|offset| *offset <= MAX_PAGE_BOUND)
    }

    /// Offset of the first row, clamped to [`MAX_PAGE_BOUND`].
    pub fn offset(&self) -> u64 { self.checked_offset().unwrap_or(MAX_PAGE_BOUND) }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            page_num: DEFAULT_PAGE_NUM,
        }
    }
}
