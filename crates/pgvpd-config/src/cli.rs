use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "pgvpd", about = "Transparent multi-tenant PostgreSQL proxy")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the proxy.
    Serve {
        #[arg(long)]
        config: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        admin_port: Option<u16>,
        #[arg(long)]
        log_level: Option<String>,
    },
}
