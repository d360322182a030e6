//! Command line definition

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "portal", version, about = "Send files to a directory over a WebSocket")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Receive uploads into a directory
    Serve(ServeOpts),
    /// Upload files and directories to a running server
    Send(SendOpts),
}

#[derive(Clone, Debug, Args)]
pub struct ServeOpts {
    /// Port to listen on (0 picks a free one)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory to receive into, created if missing
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Verbose logging
    #[arg(long)]
    pub debug: bool,
}

#[derive(Clone, Debug, Args)]
pub struct SendOpts {
    /// Server endpoint, e.g. ws://192.168.1.20:8080/ws
    pub url: String,

    /// Files or directories to send
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Verbose logging
    #[arg(long)]
    pub debug: bool,
}
