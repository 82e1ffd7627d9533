use clap::{Parser, Subcommand};

/// Beacon: assistant conversations with tool dispatch, over WebSocket or
/// the terminal.
#[derive(Parser, Debug)]
#[command(name = "beacon-gateway", version, about)]
pub struct Args {
    /// Config file path override.
    #[arg(long)]
    pub config: Option<String>,

    /// Log level override (debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Serve the WebSocket gateway (default).
    Serve {
        /// Port to listen on. Defaults to `[gateway] port`.
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Chat with the assistant in this terminal.
    Chat,
    /// Print the effective configuration as JSON.
    Config,
    /// Print the tool definitions to provision the assistant with.
    Tools,
}

pub fn parse() -> Args {
    Args::parse()
}
