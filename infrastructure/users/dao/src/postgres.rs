use async_trait::async_trait;
use dao_utils::{
    PaginationParams, create_param_refs, is_unique_violation, order_by_clause,
};
use sql_connection::SqlConnect;
use tokio_postgres::{Client, Row};
use tracing::instrument;
use user_errors::UserError;
use user_models::{NewUser, PageRequest, Role, SortField, SortingOrder, User};

use crate::store::UserStore;

const SELECT_USERS: &str = "SELECT u.id, u.email, u.full_name, r.name, \
                            u.password_hash FROM users u JOIN roles r ON r.id \
                            = u.role_id";

/// Physical column for each sortable field.
fn sort_column(field: SortField) -> &'static str {
    match field {
        SortField::Id => "u.id",
        SortField::Email => "u.email",
        SortField::Name => "u.full_name",
    }
}

#[derive(Clone)]
pub struct UserDao {
    db: SqlConnect,
}

impl UserDao {
    pub fn new(db: SqlConnect) -> Self { Self { db } }

    pub fn db(&self) -> &SqlConnect { &self.db }

    fn map_row(row: &Row) -> Result<User, UserError> {
        let role: String = row.get(3);
        let role = role.parse::<Role>().map_err(|_| {
            UserError::internal(format!("unknown role {role} in store"))
        })?;

        Ok(User {
            id: row.get(0),
            email: row.get(1),
            name: row.get(2),
            role,
            password_hash: row.get(4),
        })
    }

    async fn role_id(client: &Client, role: Role) -> Result<i32, UserError> {
        let stmt = client.prepare("SELECT id FROM roles WHERE name = $1").await?;
        let rows = client.query(&stmt, &[&role.as_str()]).await?;

        rows.first()
            .map(|row| row.get(0))
            .ok_or_else(|| {
                UserError::RoleNotFound {
                    role: role.to_string(),
                }
            })
    }

    fn unique_violation(err: tokio_postgres::Error, email: &str) -> UserError {
        if is_unique_violation(&err) {
            UserError::AlreadyExists {
                email: email.to_string(),
            }
        }
        else {
            UserError::Database(err)
        }
    }
}

#[async_trait]
impl UserStore for UserDao {
    #[instrument(skip(self, user))]
    async fn create(&self, user: NewUser) -> Result<i64, UserError> {
        let client = self.db.get_client().await?;
        let role_id = Self::role_id(&**client, user.role).await?;

        let stmt = client
            .prepare(
                "WITH email_check AS (
                     SELECT EXISTS(SELECT 1 FROM users WHERE email = $1) AS \
                 email_exists
                 ),
                 inserted AS (
                     INSERT INTO users (email, full_name, role_id, \
                 password_hash)
                     SELECT $1, $2, $3, $4
                     WHERE NOT (SELECT email_exists FROM email_check)
                     RETURNING id
                 )
                 SELECT i.id, ec.email_exists
                 FROM email_check ec
                 LEFT JOIN inserted i ON TRUE",
            )
            .await?;

        let row = client
            .query_one(
                &stmt,
                &[&user.email, &user.name, &role_id, &user.password_hash],
            )
            .await
            .map_err(|e| Self::unique_violation(e, &user.email))?;

        let id: Option<i64> = row.get(0);
        let email_exists: bool = row.get(1);

        match id {
            Some(id) if !email_exists => Ok(id),
            _ => Err(UserError::AlreadyExists { email: user.email }),
        }
    }

    #[instrument(skip(self))]
    async fn get(&self, id: i64) -> Result<User, UserError> {
        let client = self.db.get_client().await?;
        let stmt = client
            .prepare(&format!("{SELECT_USERS} WHERE u.id = $1"))
            .await?;
        let rows = client.query(&stmt, &[&id]).await?;

        rows.first()
            .map(Self::map_row)
            .unwrap_or(Err(UserError::NotFound { user_id: id }))
    }

    #[instrument(skip(self, user), fields(user_id = user.id))]
    async fn update(&self, user: User) -> Result<(), UserError> {
        let client = self.db.get_client().await?;
        let role_id = Self::role_id(&**client, user.role).await?;

        let stmt = client
            .prepare(
                "WITH conflict_check AS (
                     SELECT CASE
                         WHEN NOT EXISTS(SELECT 1 FROM users WHERE id = $1) \
                 THEN 'not_found'::text
                         WHEN EXISTS(SELECT 1 FROM users WHERE email = $2 AND \
                 id <> $1) THEN 'email_exists'::text
                         ELSE 'ok'::text
                     END AS status
                 ),
                 updated AS (
                     UPDATE users
                     SET email = $2, full_name = $3, role_id = $4, \
                 password_hash = $5
                     WHERE id = $1 AND (SELECT status FROM conflict_check) = \
                 'ok'
                     RETURNING id
                 )
                 SELECT status FROM conflict_check",
            )
            .await?;

        let row = client
            .query_one(
                &stmt,
                &[
                    &user.id,
                    &user.email,
                    &user.name,
                    &role_id,
                    &user.password_hash,
                ],
            )
            .await
            .map_err(|e| Self::unique_violation(e, &user.email))?;

        let status: String = row.get(0);
        match status.as_str() {
            "ok" => Ok(()),
            "not_found" => Err(UserError::NotFound { user_id: user.id }),
            _ => Err(UserError::AlreadyExists { email: user.email }),
        }
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i64) -> Result<(), UserError> {
        let client = self.db.get_client().await?;
        let stmt = client.prepare("DELETE FROM users WHERE id = $1").await?;
        let affected = client.execute(&stmt, &[&id]).await?;

        if affected == 0 {
            return Err(UserError::NotFound { user_id: id });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list(
        &self, page: PageRequest, order: SortingOrder,
    ) -> Result<Vec<User>, UserError> {
        let client = self.db.get_client().await?;

        let order_by =
            order_by_clause(sort_column(order.field), order.descending, "u.id");
        let (query, params) = PaginationParams::new(page.page_size, page.offset())
            .build_query_parts(SELECT_USERS, &order_by, 0);
        let param_refs = create_param_refs(&params);

        let stmt = client.prepare(&query).await?;
        let rows = client.query(&stmt, &param_refs).await?;

        rows.iter().map(Self::map_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_columns_are_allow_listed() {
        assert_eq!(sort_column(SortField::Id), "u.id");
        assert_eq!(sort_column(SortField::Email), "u.email");
        assert_eq!(sort_column(SortField::Name), "u.full_name");
    }
}
