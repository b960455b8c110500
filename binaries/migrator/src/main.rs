use anyhow::Result;
use clap::{Parser, Subcommand};
use sql_connection::{PostgresDbConfig, connect_postgres_db};
use tracing::info;
use user_dao::migrations::{MIGRATIONS, applied_migrations, run_migrations};

#[derive(Parser)]
#[command(name = "migrator")]
#[command(about = "Applies the user store schema")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(long, help = "Database URL (or use DATABASE_URL env var)")]
    database_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply every pending migration
    Up,

    /// List applied and pending migrations
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let _log_guard = app_metrics::init_tracing("migrator");

    let cli = Cli::parse();

    let mut config = PostgresDbConfig::from_env();
    if let Some(uri) = cli.database_url {
        config.uri = uri;
    }
    config.max_conn = Some(2);
    config.min_conn = None;

    let pool = connect_postgres_db(&config).await?;
    let mut client = pool.get().await?;
    info!("Connected to database successfully");

    match cli.command.unwrap_or(Commands::Up) {
        Commands::Up => {
            info!("Running all pending migrations...");
            let applied = run_migrations(&mut client).await?;
            if applied.is_empty() {
                info!("Schema is up to date");
            }
            else {
                info!("Applied {} migration(s): {:?}", applied.len(), applied);
            }
        },
        Commands::Status => {
            let applied = applied_migrations(&client).await?;
            for (name, _) in MIGRATIONS {
                let mark = if applied.iter().any(|a| a == name) {
                    "applied"
                }
                else {
                    "pending"
                };
                info!("  {} {}", mark, name);
            }
        },
    }

    Ok(())
}
