use clap::{Parser, Subcommand};

/// keygate: API key admission and per-key request quotas
#[derive(Parser)]
#[command(name = "keygate", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to bind (defaults to PORT, then 8080)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage API keys
    Key {
        #[command(subcommand)]
        command: KeyCommands,
    },
}

#[derive(Subcommand)]
pub enum KeyCommands {
    /// Issue a new API key. The key is printed once and cannot be recovered.
    Create {
        #[arg(long)]
        name: String,
        /// Requests per window; omit to use the server default
        #[arg(long)]
        limit: Option<i32>,
        /// Window length in seconds; omit to use the server default
        #[arg(long)]
        window: Option<i32>,
    },
    /// Deactivate an API key
    Revoke { key: String },
}
