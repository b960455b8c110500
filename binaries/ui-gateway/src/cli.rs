use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, long_about = None)]
#[command(name = "ui-gateway")]
#[command(about = "UI tier of the user service: relays reads over the queue")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the forwarder and serve the relay HTTP API
    Serve {
        #[arg(long, env = "HTTP_PORT", default_value_t = 8081)]
        port: u16,
    },

    /// Run only the forwarder
    Forward,

    /// Fetch one page of users through the relay
    List {
        #[arg(long)]
        page_size: Option<u64>,

        #[arg(long)]
        page_num: Option<u64>,

        /// `id`, `name` or `email`
        #[arg(long)]
        sort_field: Option<String>,

        #[arg(long)]
        descending: Option<bool>,
    },

    /// Fetch one user through the relay
    Get {
        #[arg(long)]
        id: i64,
    },
}
