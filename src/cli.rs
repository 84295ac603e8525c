//! Command-line interface for crosswire.

use clap::Parser;
use std::path::PathBuf;

/// Crosswire - real-time two-player tic-tac-toe over websockets
#[derive(Parser, Debug)]
#[command(name = "crosswire")]
#[command(about = "Two-player tic-tac-toe game server", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Address to bind the HTTP service to
    #[arg(long, default_value = "localhost:8080")]
    pub addr: String,

    /// Directory holding the static web client
    #[arg(long, default_value = "./static")]
    pub static_dir: PathBuf,

    /// Seconds a session may sit idle before teardown
    #[arg(long, default_value_t = 120)]
    pub idle_timeout: u64,

    /// Push the idle deadline back on every processed command instead
    /// of keeping the fixed deadline set at session creation
    #[arg(long)]
    pub reset_timeout_on_activity: bool,
}
