//! CLI definitions for the Conclave binary

use clap::{Parser, Subcommand};

/// Conclave orchestration server CLI
#[derive(Parser, Debug)]
#[command(name = "conclave")]
#[command(about = "Async multi-agent council orchestration server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Listen port (overrides config)
        #[arg(long)]
        port: Option<u16>,
        /// Explicit configuration file
        #[arg(long)]
        config: Option<String>,
    },
}

/// Run the parsed CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Serve { port, config }) => crate::server::run(port, config).await,
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}
