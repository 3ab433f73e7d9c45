use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "callcenter")]
#[command(about = "Real-time call-center event client")]
pub struct Cli {
    /// Use this configuration file instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Connect to the call-center channel and print events as they arrive
    ///
    /// Runs until Ctrl-C. Exits with an error once reconnect attempts are
    /// exhausted.
    ///
    /// Examples:
    ///   callcenter listen
    ///   callcenter listen --url ws://localhost:3000/ws/call-center
    ///   callcenter listen --token eyJhbGci... --json
    Listen {
        /// Channel address, overrides the configured server_url
        #[arg(short, long)]
        url: Option<String>,
        /// Bearer token sent with the opening handshake
        #[arg(short, long)]
        token: Option<String>,
        /// Print one JSON object per event instead of text lines
        #[arg(long)]
        json: bool,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Print the configuration file location
    Path,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
