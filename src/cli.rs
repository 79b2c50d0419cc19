use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

use vidfetch::observability::LogFormat;

#[derive(Parser, Debug)]
#[command(name = "vidfetch")]
#[command(about = "Video download service with live progress events", long_about = None)]
pub struct Cli {
    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server
    Server(ServerArgs),
    /// Check that the extraction tool can be run
    CheckTool(ConfigArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServerArgs {
    /// Address to bind the HTTP server to (overrides `server.bind_addr`)
    #[arg(long)]
    pub address: Option<SocketAddr>,

    #[command(flatten)]
    pub config: ConfigArgs,
}

#[derive(clap::Args, Debug)]
pub struct ConfigArgs {
    /// Configuration file (defaults to `VIDFETCH_CONFIG` or `config/vidfetch.toml`)
    #[arg(long)]
    pub config: Option<PathBuf>,
}
