mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use std::process::ExitCode;
use tracing::{error, info};

use vidfetch::config::Config;
use vidfetch::extractor::{SystemRunner, ToolRunner};
use vidfetch::observability::init_tracing;

type AnyError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<ExitCode, AnyError> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;

    match cli.command {
        Commands::Server(args) => {
            let config = Config::load_with_override(args.config.config)?;
            info!(bind_addr = %config.server.bind_addr, "Configuration loaded");
            vidfetch::api::run(config, args.address).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::CheckTool(args) => {
            let config = Config::load_with_override(args.config)?;
            let runner = SystemRunner::new(config.extractor.binary.clone());
            match runner.version().await {
                Ok(version) => {
                    println!("{} {}", runner.binary().display(), version);
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    error!(
                        binary = %runner.binary().display(),
                        error = %e,
                        "Extraction tool check failed"
                    );
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}
