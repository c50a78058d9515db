use clap::{Parser, Subcommand};

use maintdesk::models::request::Priority;

/// maintdesk: maintenance request intake and admin notifier
#[derive(Parser)]
#[command(name = "maintdesk", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the intake form and API, with the request watcher alongside
    Serve {
        /// Port to bind (defaults to MAINTDESK_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Run the intake endpoint only
        #[arg(long)]
        no_watcher: bool,
    },

    /// Run the request watcher only
    Watch,

    /// Apply database migrations and exit
    Migrate,

    /// Insert a maintenance request from the command line
    Submit {
        #[arg(long)]
        room: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        building: Option<String>,
        /// low, medium or high
        #[arg(long, default_value = "medium")]
        priority: Priority,
    },
}
