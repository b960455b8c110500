use tokio_postgres::Client;
use tracing::info;

use sql_connection::PgError;

/// Ordered schema migrations. Names are recorded in `_migrations` once
/// applied and never re-run.
pub const MIGRATIONS: &[(&str, &str)] = &[(
    "001_create_roles_and_users",
    include_str!("../migrations/001_create_roles_and_users.sql"),
)];

async fn create_migration_table(client: &Client) -> Result<(), PgError> {
    client
        .batch_execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                 id SERIAL PRIMARY KEY,
                 name VARCHAR(255) NOT NULL UNIQUE,
                 applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
             )",
        )
        .await
}

pub async fn applied_migrations(client: &Client) -> Result<Vec<String>, PgError> {
    create_migration_table(client).await?;
    let rows = client
        .query("SELECT name FROM _migrations ORDER BY id", &[])
        .await?;
    Ok(rows.iter().map(|row| row.get(0)).collect())
}

/// Applies every pending migration, each in its own transaction. Returns
/// the names that were applied by this call.
pub async fn run_migrations(
    client: &mut Client,
) -> Result<Vec<&'static str>, PgError> {
    let applied = applied_migrations(client).await?;
    let mut newly_applied = Vec::new();

    for (name, sql) in MIGRATIONS {
        if applied.iter().any(|a| a == name) {
            info!("Migration {} already applied, skipping", name);
            continue;
        }

        let tx = client.transaction().await?;
        tx.batch_execute(sql).await?;
        tx.execute("INSERT INTO _migrations (name) VALUES ($1)", &[name])
            .await?;
        tx.commit().await?;

        info!("Migration {} completed successfully", name);
        newly_applied.push(*name);
    }

    Ok(newly_applied)
}
